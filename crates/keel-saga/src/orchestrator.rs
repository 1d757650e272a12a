//! In-memory saga execution with LIFO compensation.

use keel_core::error::DomainError;

use crate::step::SagaStep;

/// Outcome of running a saga.
#[derive(Debug)]
pub enum SagaResult {
    /// Every step completed.
    Success,
    /// A step failed and every completed step was compensated.
    Failed {
        /// Name of the step that failed.
        step: String,
        /// The step's error.
        error: DomainError,
    },
    /// A step failed and at least one compensation also failed. The saga
    /// is left partially applied and needs manual intervention.
    CompensationFailed {
        /// Name of the step that failed.
        step: String,
        /// The step's error.
        error: DomainError,
        /// Name of the first step whose compensation failed.
        compensation_step: String,
        /// The first compensation error.
        compensation_error: DomainError,
    },
}

impl SagaResult {
    /// Returns `true` if every step completed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub(crate) fn from_failure(step: String, error: DomainError, unwind: Unwind) -> Self {
        match unwind.first_failure {
            None => Self::Failed { step, error },
            Some((compensation_step, compensation_error)) => Self::CompensationFailed {
                step,
                error,
                compensation_step,
                compensation_error,
            },
        }
    }
}

/// What happened while compensating.
#[derive(Debug, Default)]
pub(crate) struct Unwind {
    /// Steps whose compensation succeeded, in the order they ran.
    pub(crate) compensated: Vec<String>,
    /// The first compensation that failed, if any.
    pub(crate) first_failure: Option<(String, DomainError)>,
}

/// Runs an ordered list of steps, compensating completed ones on failure.
pub struct SagaOrchestrator<D> {
    saga_type: String,
    steps: Vec<Box<dyn SagaStep<D>>>,
}

impl<D> std::fmt::Debug for SagaOrchestrator<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaOrchestrator")
            .field("saga_type", &self.saga_type)
            .field("steps", &self.steps.len())
            .finish()
    }
}

impl<D: Send + 'static> SagaOrchestrator<D> {
    /// Creates an orchestrator with no steps.
    #[must_use]
    pub fn new(saga_type: impl Into<String>) -> Self {
        Self {
            saga_type: saga_type.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step. Steps run in the order they are added.
    #[must_use]
    pub fn step(mut self, step: impl SagaStep<D> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Returns the saga type name.
    #[must_use]
    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    /// Returns the step names in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }

    pub(crate) fn steps(&self) -> &[Box<dyn SagaStep<D>>] {
        &self.steps
    }

    /// Runs the saga against `data`.
    ///
    /// Steps execute one at a time in declared order. If a step fails, the
    /// steps completed before it are compensated newest first; the failing
    /// step itself is not. A failing compensation is logged and the
    /// remaining compensations still run.
    #[tracing::instrument(skip(self, data), fields(saga_type = %self.saga_type))]
    pub async fn execute(&self, data: &mut D) -> SagaResult {
        for (index, step) in self.steps.iter().enumerate() {
            tracing::debug!(step = step.name(), index, "executing saga step");
            if let Err(error) = step.execute(data).await {
                tracing::info!(step = step.name(), %error, "saga step failed; compensating");
                let unwind = self.compensate(index, data).await;
                return SagaResult::from_failure(step.name().to_owned(), error, unwind);
            }
        }

        tracing::info!(steps = self.steps.len(), "saga completed");
        SagaResult::Success
    }

    /// Compensates the steps at indices `0..upto`, newest first.
    pub(crate) async fn compensate(&self, upto: usize, data: &mut D) -> Unwind {
        let mut unwind = Unwind::default();
        for step in self.steps[..upto.min(self.steps.len())].iter().rev() {
            match step.compensate(data).await {
                Ok(()) => unwind.compensated.push(step.name().to_owned()),
                Err(error) => {
                    tracing::error!(
                        saga_type = %self.saga_type,
                        step = step.name(),
                        %error,
                        "compensation failed; continuing with remaining steps"
                    );
                    if unwind.first_failure.is_none() {
                        unwind.first_failure = Some((step.name().to_owned(), error));
                    }
                }
            }
        }
        unwind
    }
}
