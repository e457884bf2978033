//! Persistence capabilities for users, orders and notifications.
//!
//! The store traits are the only thing the orchestration crates depend on.
//! Two backends are provided:
//! - [`InMemoryStore`] for tests and the self-contained binary
//! - [`PostgresStore`] backed by `sqlx`

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StorageError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{NotificationStore, OrderStore, UserStore};
