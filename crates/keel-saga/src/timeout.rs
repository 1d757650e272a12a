//! Deadline decorator for saga steps.

use std::time::Duration;

use async_trait::async_trait;
use keel_core::error::DomainError;

use crate::step::SagaStep;

/// Wraps a step so its `execute` fails with `DomainError::Infrastructure`
/// when it does not finish within `timeout`.
///
/// A timed-out step counts as failed and is not compensated; its inner
/// future is dropped at the deadline. Compensation runs without a deadline.
#[derive(Debug, Clone)]
pub struct TimeoutStep<S> {
    inner: S,
    timeout: Duration,
}

impl<S> TimeoutStep<S> {
    /// Bounds `inner` by `timeout`.
    #[must_use]
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<D, S> SagaStep<D> for TimeoutStep<S>
where
    D: Send,
    S: SagaStep<D>,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn execute(&self, data: &mut D) -> Result<(), DomainError> {
        tokio::time::timeout(self.timeout, self.inner.execute(data))
            .await
            .map_err(|_| {
                DomainError::Infrastructure(format!(
                    "saga step {} timed out after {} ms",
                    self.inner.name(),
                    self.timeout.as_millis()
                ))
            })?
    }

    async fn compensate(&self, data: &mut D) -> Result<(), DomainError> {
        self.inner.compensate(data).await
    }
}
