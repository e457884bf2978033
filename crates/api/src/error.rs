//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use notifications::NotificationError;
use ordering::OrderingError;
use storage::StorageError;
use thiserror::Error;
use transport::TransportError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),
    /// Order or user workflow error.
    #[error(transparent)]
    Ordering(#[from] OrderingError),
    /// Notification query error.
    #[error(transparent)]
    Notification(#[from] NotificationError),
}

impl ApiError {
    /// The HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Ordering(err) => ordering_status(err),
            ApiError::Notification(err) => notification_status(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "request failed");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn ordering_status(err: &OrderingError) -> StatusCode {
    match err {
        OrderingError::Validation(_) => StatusCode::BAD_REQUEST,
        OrderingError::UserNotFound(_) | OrderingError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        OrderingError::EmailAlreadyRegistered(_) => StatusCode::CONFLICT,
        OrderingError::Debit { .. } | OrderingError::AccountCreation { .. } => {
            StatusCode::BAD_GATEWAY
        }
        OrderingError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        OrderingError::Persistence { .. } | OrderingError::FundsLostOrderNotPersisted { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn notification_status(err: &NotificationError) -> StatusCode {
    match err {
        NotificationError::NotFound(_) => StatusCode::NOT_FOUND,
        NotificationError::Decode { .. } => StatusCode::BAD_REQUEST,
        NotificationError::Delivery { .. } => StatusCode::BAD_GATEWAY,
        NotificationError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        NotificationError::Persistence { .. } | NotificationError::StatusUpdate { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Errors that abort the binary before or after serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to install metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("Store setup failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport setup failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}
