//! Saga state and its persistence abstraction.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Lifecycle of a saga instance.
///
/// `Pending -> Running -> Completed`, or
/// `Pending -> Running -> Compensating -> Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SagaStatus {
    /// Created but no step has started.
    Pending,
    /// Steps are executing.
    Running,
    /// Every step executed.
    Completed,
    /// A step failed and completed steps are being compensated.
    Compensating,
    /// Compensation finished, successfully or not.
    Failed,
}

impl SagaStatus {
    /// Returns the persisted name of this status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Compensating => "compensating",
            Self::Failed => "failed",
        }
    }

    /// Returns `true` for `Completed` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SagaStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "compensating" => Ok(Self::Compensating),
            "failed" => Ok(Self::Failed),
            other => Err(DomainError::Serialization(format!(
                "unknown saga status: {other}"
            ))),
        }
    }
}

/// Persisted progress of one saga instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaState {
    /// Saga instance identifier.
    pub id: Uuid,
    /// Logical saga type (which step list it runs).
    pub saga_type: String,
    /// Serialized shared data context.
    pub data: serde_json::Value,
    /// Lifecycle status.
    pub status: SagaStatus,
    /// Index of the step currently executing (or last attempted).
    pub current_step: usize,
    /// Names of the steps that executed successfully, in order.
    pub completed_steps: Vec<String>,
    /// Error that failed the saga, if any.
    pub error: Option<String>,
    /// When the saga was triggered.
    pub created_at: DateTime<Utc>,
    /// When the state was last changed.
    pub updated_at: DateTime<Utc>,
}

impl SagaState {
    /// Creates the `Pending` state of a newly triggered saga.
    #[must_use]
    pub fn pending(
        id: Uuid,
        saga_type: impl Into<String>,
        data: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            saga_type: saga_type.into(),
            data,
            status: SagaStatus::Pending,
            current_step: 0,
            completed_steps: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Persistence for saga progress.
#[async_trait]
pub trait SagaStateStore: Send + Sync {
    /// Inserts or replaces the state of a saga instance.
    async fn save(&self, state: &SagaState) -> Result<(), DomainError>;

    /// Loads one saga instance.
    async fn load(&self, id: Uuid) -> Result<Option<SagaState>, DomainError>;

    /// Lists the sagas of a type currently in `status`, oldest first.
    async fn find_by_status(
        &self,
        saga_type: &str,
        status: SagaStatus,
    ) -> Result<Vec<SagaState>, DomainError>;
}
