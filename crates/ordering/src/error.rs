//! Ordering error types.

use std::time::Duration;

use common::{Money, OrderId, UserId};
use domain::ValidationError;
use storage::StorageError;
use thiserror::Error;

/// Errors reported by the account ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The user has no ledger account.
    #[error("No ledger account for user {0}")]
    AccountNotFound(UserId),

    /// An account already exists for the user.
    #[error("Ledger account for user {0} already exists")]
    AccountExists(UserId),

    /// A deposit would push the balance past the representable maximum.
    #[error("Deposit would overflow the balance of user {0}")]
    BalanceOverflow(UserId),

    /// The ledger could not be reached or refused the call.
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur during order orchestration.
#[derive(Debug, Error)]
pub enum OrderingError {
    /// The request failed validation before any side effect.
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// User not found.
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Another user already registered this email.
    #[error("Email already registered: {0}")]
    EmailAlreadyRegistered(String),

    /// The ledger call failed. Nothing was persisted or published.
    #[error("Debit for user {user_id} failed: {source}")]
    Debit {
        user_id: UserId,
        #[source]
        source: LedgerError,
    },

    /// The ledger account could not be created; the user was rolled back.
    #[error("Ledger account creation for user {user_id} failed: {source}")]
    AccountCreation {
        user_id: UserId,
        #[source]
        source: LedgerError,
    },

    /// A store call failed.
    #[error("Storage operation {operation} failed: {source}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: StorageError,
    },

    /// Funds were debited but the order row was never written.
    ///
    /// Requires manual reconciliation.
    #[error("Debited {amount} from user {user_id} but the order was not persisted: {reason}")]
    FundsLostOrderNotPersisted {
        user_id: UserId,
        amount: Money,
        reason: String,
    },

    /// The operation exceeded its deadline.
    #[error("Operation {operation} exceeded its {limit:?} deadline")]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },
}

impl OrderingError {
    pub(crate) fn persistence(operation: &'static str) -> impl FnOnce(StorageError) -> Self {
        move |source| OrderingError::Persistence { operation, source }
    }
}

/// Convenience type alias for ordering results.
pub type Result<T> = std::result::Result<T, OrderingError>;
