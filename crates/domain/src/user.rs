//! Registered users.

use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A registered user as stored by the user store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
}

impl NewUser {
    /// Creates a validated new user.
    ///
    /// Surrounding whitespace is trimmed from both fields.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let username = username.into().trim().to_string();
        let email = email.into().trim().to_string();

        if username.is_empty() {
            return Err(ValidationError::EmptyUsername);
        }
        if !is_plausible_email(&email) {
            return Err(ValidationError::InvalidEmail(email));
        }

        Ok(Self { username, email })
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_trims_fields() {
        let user = NewUser::new("  alice ", " alice@example.com ").unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.email, "alice@example.com");
    }

    #[test]
    fn test_new_user_rejects_bad_input() {
        assert_eq!(
            NewUser::new("", "a@b.com"),
            Err(ValidationError::EmptyUsername)
        );
        assert!(matches!(
            NewUser::new("bob", "not-an-email"),
            Err(ValidationError::InvalidEmail(_))
        ));
        assert!(matches!(
            NewUser::new("bob", "@b.com"),
            Err(ValidationError::InvalidEmail(_))
        ));
    }
}
