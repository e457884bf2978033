use thiserror::Error;

/// Errors that can occur when interacting with a store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The row to update or delete does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: u64 },

    /// A uniqueness constraint rejected the write.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// The backend is not reachable or refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be mapped back to a domain type.
    #[error("Invalid stored value: {0}")]
    InvalidData(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StorageError>;
