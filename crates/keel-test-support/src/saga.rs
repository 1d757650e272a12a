//! Scripted saga steps that record what the orchestrator asked of them.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use keel_core::error::DomainError;
use keel_saga::SagaStep;

/// Shared, ordered record of step calls: `"execute:<name>"` and
/// `"compensate:<name>"`.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the calls recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.0.lock().unwrap().push(call);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    Succeed,
    Fail,
    Hang,
}

/// A saga step whose outcome is fixed up front.
#[derive(Debug, Clone)]
pub struct ScriptedStep {
    name: String,
    log: CallLog,
    execute: Behaviour,
    compensate: Behaviour,
}

impl ScriptedStep {
    /// A step whose execute and compensate both succeed.
    #[must_use]
    pub fn ok(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_owned(),
            log: log.clone(),
            execute: Behaviour::Succeed,
            compensate: Behaviour::Succeed,
        }
    }

    /// A step whose execute fails with a validation error.
    #[must_use]
    pub fn failing(name: &str, log: &CallLog) -> Self {
        Self {
            execute: Behaviour::Fail,
            ..Self::ok(name, log)
        }
    }

    /// A step whose execute never completes.
    #[must_use]
    pub fn hanging(name: &str, log: &CallLog) -> Self {
        Self {
            execute: Behaviour::Hang,
            ..Self::ok(name, log)
        }
    }

    /// Makes this step's compensation fail.
    #[must_use]
    pub fn with_failing_compensation(mut self) -> Self {
        self.compensate = Behaviour::Fail;
        self
    }

    async fn run(&self, phase: &str, behaviour: Behaviour) -> Result<(), DomainError> {
        self.log.record(format!("{phase}:{}", self.name));
        match behaviour {
            Behaviour::Succeed => Ok(()),
            Behaviour::Fail => Err(DomainError::Validation(format!(
                "{} {phase} failed",
                self.name
            ))),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl<D: Send + 'static> SagaStep<D> for ScriptedStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _data: &mut D) -> Result<(), DomainError> {
        self.run("execute", self.execute).await
    }

    async fn compensate(&self, _data: &mut D) -> Result<(), DomainError> {
        self.run("compensate", self.compensate).await
    }
}
