use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::OrderingError;

/// A time budget shared by the steps of one operation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    expires_at: Instant,
    limit: Duration,
}

impl Deadline {
    pub(crate) fn start(limit: Duration) -> Self {
        Self {
            expires_at: Instant::now() + limit,
            limit,
        }
    }

    fn timeout(&self, operation: &'static str) -> OrderingError {
        OrderingError::Timeout {
            operation,
            limit: self.limit,
        }
    }

    /// Runs `step` with whatever time is left.
    ///
    /// Fails without polling `step` when the budget is already spent.
    pub(crate) async fn run<F: Future>(
        &self,
        operation: &'static str,
        step: F,
    ) -> Result<F::Output, OrderingError> {
        let now = Instant::now();
        if now >= self.expires_at {
            return Err(self.timeout(operation));
        }
        tokio::time::timeout_at(self.expires_at, step)
            .await
            .map_err(|_| self.timeout(operation))
    }
}
