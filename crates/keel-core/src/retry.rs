//! Reload-modify-retry helper for optimistic concurrency.
//!
//! Stores never retry a conflicting append themselves. Callers that want
//! to re-run a whole load-execute-save cycle after losing a race wrap it in
//! [`retry_on_conflict`].

use std::future::Future;

use crate::error::DomainError;

/// Runs `operation` until it succeeds, fails with a non-conflict error, or
/// `max_attempts` attempts have been made.
///
/// `operation` receives the 1-based attempt number and must reload the
/// aggregate itself on every attempt.
///
/// # Errors
///
/// Returns the first error that is not a `ConcurrencyConflict`, or the last
/// conflict once the attempts are exhausted.
pub async fn retry_on_conflict<T, F, Fut>(
    max_attempts: u32,
    mut operation: F,
) -> Result<T, DomainError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, DomainError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Err(error) if error.is_retryable() && attempt < max_attempts => {
                tracing::debug!(attempt, %error, "concurrency conflict; retrying");
                attempt += 1;
            }
            result => return result,
        }
    }
}
