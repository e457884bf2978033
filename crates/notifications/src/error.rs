//! Notification error types.

use std::time::Duration;

use common::NotificationId;
use storage::StorageError;
use thiserror::Error;
use transport::TransportError;

/// Errors reported by a mail sender.
#[derive(Debug, Error)]
pub enum MailError {
    /// The mail relay rejected the message.
    #[error("Mail rejected: {0}")]
    Rejected(String),

    /// The outbox publish failed.
    #[error("Mail outbox unavailable: {0}")]
    Outbox(#[from] TransportError),
}

/// Errors that can occur while routing events and recording notifications.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Notification not found.
    #[error("Notification not found: {0}")]
    NotFound(NotificationId),

    /// A store call failed before anything was recorded.
    #[error("Storage operation {operation} failed: {source}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: StorageError,
    },

    /// The row was created but could not be marked sent; it stays pending.
    #[error("Notification {notification_id} stored but status update failed: {source}")]
    StatusUpdate {
        notification_id: NotificationId,
        #[source]
        source: StorageError,
    },

    /// Mail delivery failed while delivery was required.
    #[error("Delivery of notification {notification_id} failed: {source}")]
    Delivery {
        notification_id: NotificationId,
        #[source]
        source: MailError,
    },

    /// The payload is not valid for its event type.
    #[error("Cannot decode {event_type} event: {source}")]
    Decode {
        event_type: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The event was not recorded before its deadline. Nothing was persisted.
    #[error("Event handling exceeded its {limit:?} deadline")]
    Timeout { limit: Duration },
}

impl NotificationError {
    pub(crate) fn persistence(operation: &'static str) -> impl FnOnce(StorageError) -> Self {
        move |source| NotificationError::Persistence { operation, source }
    }

    pub(crate) fn decode(event_type: &'static str) -> impl FnOnce(serde_json::Error) -> Self {
        move |source| NotificationError::Decode { event_type, source }
    }
}

/// Result type for notification operations.
pub type Result<T> = std::result::Result<T, NotificationError>;
