//! `PostgreSQL` implementation of the `SagaStateStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keel_core::error::DomainError;
use keel_core::saga::{SagaState, SagaStateStore, SagaStatus};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::db_error;

const SELECT_SAGA_COLUMNS: &str = "SELECT id, saga_type, data, status, current_step, \
     completed_steps, error, created_at, updated_at FROM saga_states";

#[derive(Debug, FromRow)]
struct SagaRow {
    id: Uuid,
    saga_type: String,
    data: serde_json::Value,
    status: String,
    current_step: i32,
    completed_steps: serde_json::Value,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SagaRow> for SagaState {
    type Error = DomainError;

    fn try_from(row: SagaRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            saga_type: row.saga_type,
            data: row.data,
            status: row.status.parse()?,
            current_step: usize::try_from(row.current_step).map_err(|_| {
                DomainError::Serialization(format!(
                    "saga {} has negative current_step {}",
                    row.id, row.current_step
                ))
            })?,
            completed_steps: serde_json::from_value(row.completed_steps)?,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// PostgreSQL-backed saga state store.
#[derive(Debug, Clone)]
pub struct PgSagaStateStore {
    pool: PgPool,
}

impl PgSagaStateStore {
    /// Creates a new `PgSagaStateStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SagaStateStore for PgSagaStateStore {
    #[tracing::instrument(skip(self, state), fields(saga_id = %state.id, status = %state.status))]
    async fn save(&self, state: &SagaState) -> Result<(), DomainError> {
        let current_step = i32::try_from(state.current_step).map_err(|_| {
            DomainError::Validation(format!("saga step index {} too large", state.current_step))
        })?;
        let completed_steps = serde_json::to_value(&state.completed_steps)?;

        sqlx::query(
            r"
            INSERT INTO saga_states (
                id, saga_type, data, status, current_step,
                completed_steps, error, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE
            SET data = EXCLUDED.data,
                status = EXCLUDED.status,
                current_step = EXCLUDED.current_step,
                completed_steps = EXCLUDED.completed_steps,
                error = EXCLUDED.error,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(state.id)
        .bind(&state.saga_type)
        .bind(&state.data)
        .bind(state.status.as_str())
        .bind(current_step)
        .bind(&completed_steps)
        .bind(state.error.as_deref())
        .bind(state.created_at)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("failed to save saga state", &e))?;

        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<SagaState>, DomainError> {
        let row: Option<SagaRow> = sqlx::query_as(&format!("{SELECT_SAGA_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("failed to load saga state", &e))?;

        row.map(SagaState::try_from).transpose()
    }

    async fn find_by_status(
        &self,
        saga_type: &str,
        status: SagaStatus,
    ) -> Result<Vec<SagaState>, DomainError> {
        let rows: Vec<SagaRow> = sqlx::query_as(&format!(
            "{SELECT_SAGA_COLUMNS} WHERE saga_type = $1 AND status = $2 ORDER BY created_at, id"
        ))
        .bind(saga_type)
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("failed to query saga states", &e))?;

        rows.into_iter().map(SagaState::try_from).collect()
    }
}
