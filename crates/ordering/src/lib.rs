//! Order orchestration for the purchase workflow.
//!
//! Creating an order spans three independent subsystems without a shared
//! transaction:
//! 1. Debit the user's balance through the account ledger
//! 2. Persist the order with the debit outcome as its status
//! 3. Publish the outcome for the notification service
//!
//! A declined debit is a normal outcome and still produces an order and an
//! event. A persistence failure after a successful debit cannot be undone
//! here and is surfaced as [`OrderingError::FundsLostOrderNotPersisted`].

mod deadline;
pub mod error;
pub mod ledger;
pub mod orchestrator;

pub use error::{LedgerError, OrderingError, Result};
pub use ledger::{AuthToken, InMemoryLedger, LedgerClient, WITHDRAWAL_LOG_CAPACITY, Withdrawal};
pub use orchestrator::{OrchestratorConfig, OrderOrchestrator};
