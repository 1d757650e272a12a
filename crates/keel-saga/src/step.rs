//! Saga step abstraction.

use async_trait::async_trait;
use keel_core::error::DomainError;

/// One forward action of a saga together with the action that undoes it.
///
/// `compensate` is only called for steps whose `execute` succeeded, and
/// may be called again after a crash, so it must be idempotent.
#[async_trait]
pub trait SagaStep<D>: Send + Sync {
    /// Stable name used in logs and persisted saga state.
    fn name(&self) -> &str;

    /// Performs the step, updating the shared saga data.
    async fn execute(&self, data: &mut D) -> Result<(), DomainError>;

    /// Undoes a previously successful `execute`.
    async fn compensate(&self, data: &mut D) -> Result<(), DomainError>;
}
