//! Bounded immediate retry.

use std::fmt::Display;
use std::future::Future;

use tracing::{info, warn};

/// Runs `operation` up to `max_attempts` times without delay between attempts.
///
/// A `max_attempts` of zero is treated as one. Returns the first success or
/// the last error.
pub async fn retry_immediately<F, Fut, T, E>(
    max_attempts: u32,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(
                        operation = operation_name,
                        attempt, "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(e) if attempt < max_attempts => {
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Attempt failed, retrying"
                );
                attempt += 1;
            }
            Err(e) => {
                warn!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %e,
                    "All attempts failed"
                );
                return Err(e);
            }
        }
    }
}
