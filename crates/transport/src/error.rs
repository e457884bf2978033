use thiserror::Error;

/// Errors that can occur when talking to the message transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Publishing to an exchange that was never declared.
    #[error("Exchange not found: {0}")]
    ExchangeNotFound(String),

    /// Consuming from or binding a queue that was never declared.
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    /// An exchange was redeclared with a different kind.
    #[error("Exchange {name} already declared as {existing}")]
    TopologyMismatch { name: String, existing: String },

    /// The transport has been closed.
    #[error("Transport is closed")]
    Closed,

    /// The broker refused or dropped the operation.
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    /// Publishing kept failing after every allowed attempt.
    #[error("Publish to {exchange}/{routing_key} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        exchange: String,
        routing_key: String,
        attempts: u32,
        last_error: Box<TransportError>,
    },

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
