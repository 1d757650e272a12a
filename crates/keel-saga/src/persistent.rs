//! Saga execution with durable progress tracking and crash recovery.

use std::sync::Arc;

use keel_core::clock::{SharedClock, SystemClock};
use keel_core::error::DomainError;
use keel_core::saga::{SagaState, SagaStateStore, SagaStatus};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::orchestrator::{SagaOrchestrator, SagaResult};

/// A saga found in flight at startup and compensated by
/// [`PersistentSagaOrchestrator::recover`].
#[derive(Debug)]
pub struct RecoveredSaga {
    /// The saga instance.
    pub saga_id: Uuid,
    /// Index of the step that was in flight when the saga stopped.
    pub interrupted_step: usize,
    /// Steps whose compensation succeeded, newest first.
    pub compensated_steps: Vec<String>,
    /// The first compensation that failed, if any.
    pub compensation_failure: Option<(String, DomainError)>,
}

/// Wraps a [`SagaOrchestrator`] and records each saga's progress in a
/// [`SagaStateStore`].
///
/// The stored `current_step` is the index of the step in flight. A saga
/// whose future is dropped mid-step stays `Running` at that index with
/// its completed steps intact, which is what [`recover`](Self::recover)
/// looks for.
pub struct PersistentSagaOrchestrator<D> {
    saga: SagaOrchestrator<D>,
    store: Arc<dyn SagaStateStore>,
    clock: SharedClock,
}

impl<D> std::fmt::Debug for PersistentSagaOrchestrator<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentSagaOrchestrator")
            .field("saga", &self.saga)
            .finish_non_exhaustive()
    }
}

impl<D> PersistentSagaOrchestrator<D>
where
    D: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Creates a persistent orchestrator for `saga`.
    #[must_use]
    pub fn new(saga: SagaOrchestrator<D>, store: Arc<dyn SagaStateStore>) -> Self {
        Self {
            saga,
            store,
            clock: SystemClock::shared(),
        }
    }

    /// Overrides the clock used for `created_at`/`updated_at`.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the saga type name.
    #[must_use]
    pub fn saga_type(&self) -> &str {
        self.saga.saga_type()
    }

    /// Runs saga `saga_id` against `data`, persisting its state as it goes.
    ///
    /// The state is saved as `Running` before the first step, after every
    /// completed step, as `Compensating` when a step fails, and finally as
    /// `Completed` or `Failed`. Compensation runs even if recording
    /// `Compensating` fails.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if `data` cannot be serialized,
    /// or the saga state store's error. Step failures are reported through
    /// the returned [`SagaResult`], not as `Err`, unless the store also
    /// failed while recording them; the `Infrastructure` error then names
    /// the failed step and its error.
    #[tracing::instrument(skip(self, data), fields(saga_type = %self.saga.saga_type()))]
    pub async fn execute(&self, saga_id: Uuid, data: &mut D) -> Result<SagaResult, DomainError> {
        let mut state = SagaState::pending(
            saga_id,
            self.saga.saga_type(),
            serde_json::to_value(&*data)?,
            self.clock.now(),
        );
        self.transition(&mut state, SagaStatus::Running, None).await?;

        for (index, step) in self.saga.steps().iter().enumerate() {
            if let Err(error) = step.execute(data).await {
                tracing::info!(%saga_id, step = step.name(), %error, "saga step failed; compensating");
                let marked = self
                    .transition(&mut state, SagaStatus::Compensating, Some(error.to_string()))
                    .await;

                let unwind = self.saga.compensate(index, data).await;
                state.data = serde_json::to_value(&*data)?;
                let message = match &unwind.first_failure {
                    None => error.to_string(),
                    Some((name, e)) => format!("{error}; compensation of {name} failed: {e}"),
                };
                let finished = self
                    .transition(&mut state, SagaStatus::Failed, Some(message))
                    .await;
                if let Err(store_error) = marked.and(finished) {
                    return Err(DomainError::Infrastructure(format!(
                        "saga {saga_id} step {} failed ({error}) and its state was not recorded: {store_error}",
                        step.name()
                    )));
                }
                return Ok(SagaResult::from_failure(step.name().to_owned(), error, unwind));
            }

            state.completed_steps.push(step.name().to_owned());
            state.current_step = index + 1;
            state.data = serde_json::to_value(&*data)?;
            state.updated_at = self.clock.now();
            self.store.save(&state).await?;
        }

        self.transition(&mut state, SagaStatus::Completed, None).await?;
        Ok(SagaResult::Success)
    }

    /// Compensates every saga of this type left `Running` or `Compensating`
    /// by a previous process.
    ///
    /// Each one is marked `Compensating`, its steps are compensated newest
    /// first, and it is then marked `Failed`. For a `Running` saga that
    /// includes the step in flight, whose outcome is unknown, so
    /// compensations must tolerate undoing a step whose `execute` never
    /// finished. A `Compensating` saga's current step is the one that
    /// failed; only the steps before it are compensated.
    ///
    /// # Errors
    ///
    /// Returns the saga state store's error. A saga whose stored data no
    /// longer decodes is marked `Failed` without compensation.
    #[tracing::instrument(skip(self), fields(saga_type = %self.saga.saga_type()))]
    pub async fn recover(&self) -> Result<Vec<RecoveredSaga>, DomainError> {
        let mut interrupted = self
            .store
            .find_by_status(self.saga.saga_type(), SagaStatus::Running)
            .await?;
        interrupted.extend(
            self.store
                .find_by_status(self.saga.saga_type(), SagaStatus::Compensating)
                .await?,
        );

        let mut recovered = Vec::with_capacity(interrupted.len());
        for mut state in interrupted {
            let interrupted_step = state.current_step;
            let mut data: D = match serde_json::from_value(state.data.clone()) {
                Ok(data) => data,
                Err(error) => {
                    tracing::error!(saga_id = %state.id, %error, "saga data does not decode; marking failed");
                    self.transition(
                        &mut state,
                        SagaStatus::Failed,
                        Some(format!("recovery failed: {error}")),
                    )
                    .await?;
                    continue;
                }
            };

            let upto = if state.status == SagaStatus::Compensating {
                interrupted_step
            } else {
                interrupted_step + 1
            };
            tracing::info!(saga_id = %state.id, interrupted_step, status = %state.status, "recovering interrupted saga");
            let previous_error = state.error.take();
            self.transition(&mut state, SagaStatus::Compensating, previous_error)
                .await?;

            let unwind = self.saga.compensate(upto, &mut data).await;
            state.data = serde_json::to_value(&data)?;
            let message = match &unwind.first_failure {
                None => "interrupted; compensated on recovery".to_owned(),
                Some((name, e)) => format!("interrupted; compensation of {name} failed: {e}"),
            };
            self.transition(&mut state, SagaStatus::Failed, Some(message))
                .await?;

            recovered.push(RecoveredSaga {
                saga_id: state.id,
                interrupted_step,
                compensated_steps: unwind.compensated,
                compensation_failure: unwind.first_failure,
            });
        }
        Ok(recovered)
    }

    async fn transition(
        &self,
        state: &mut SagaState,
        status: SagaStatus,
        error: Option<String>,
    ) -> Result<(), DomainError> {
        state.status = status;
        state.error = error;
        state.updated_at = self.clock.now();
        self.store.save(state).await?;
        tracing::info!(saga_id = %state.id, %status, "saga state changed");
        Ok(())
    }
}
