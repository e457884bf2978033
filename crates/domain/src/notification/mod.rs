//! Notification records.

use chrono::{DateTime, Utc};
use common::{NotificationId, UserId};
use serde::{Deserialize, Serialize};

/// Delivery status of a notification.
///
/// ```text
/// Pending ──┬──► Sent
///           └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    #[default]
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "sent" => Ok(NotificationStatus::Sent),
            "failed" => Ok(NotificationStatus::Failed),
            other => Err(format!("unknown notification status: {other}")),
        }
    }
}

/// A persisted notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A composed notification that has not been persisted yet.
///
/// New rows always start out `Pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: UserId,
    pub email: String,
    pub subject: String,
    pub message: String,
}

impl NewNotification {
    /// Creates a new notification request.
    pub fn new(
        user_id: UserId,
        email: impl Into<String>,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            email: email.into(),
            subject: subject.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!(NotificationStatus::default(), NotificationStatus::Pending);
        assert_eq!(NotificationStatus::Sent.to_string(), "sent");
        assert_eq!(
            "failed".parse::<NotificationStatus>().unwrap(),
            NotificationStatus::Failed
        );
        assert!("delivered".parse::<NotificationStatus>().is_err());
    }
}
