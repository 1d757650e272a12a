//! `PostgreSQL` implementation of the `SnapshotStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keel_core::error::DomainError;
use keel_core::snapshot::{Snapshot, SnapshotStore};
use keel_core::stream::StreamId;
use sqlx::{FromRow, PgPool};

use crate::db_error;

#[derive(Debug, FromRow)]
struct SnapshotRow {
    stream_id: String,
    stream_type: String,
    version: i64,
    state: serde_json::Value,
    taken_at: DateTime<Utc>,
}

/// PostgreSQL-backed snapshot store keeping one row per stream.
#[derive(Debug, Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    /// Creates a new `PgSnapshotStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn load(&self, stream_id: &StreamId) -> Result<Option<Snapshot>, DomainError> {
        let row: Option<SnapshotRow> = sqlx::query_as(
            r"
            SELECT stream_id, stream_type, version, state, taken_at
            FROM snapshots
            WHERE stream_id = $1
            ",
        )
        .bind(stream_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("failed to load snapshot", &e))?;

        Ok(row.map(|row| Snapshot {
            stream_id: StreamId::new(row.stream_id),
            stream_type: row.stream_type,
            version: row.version,
            state: row.state,
            taken_at: row.taken_at,
        }))
    }

    async fn save(&self, snapshot: Snapshot) -> Result<(), DomainError> {
        sqlx::query(
            r"
            INSERT INTO snapshots (stream_id, stream_type, version, state, taken_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (stream_id) DO UPDATE
            SET stream_type = EXCLUDED.stream_type,
                version = EXCLUDED.version,
                state = EXCLUDED.state,
                taken_at = EXCLUDED.taken_at
            WHERE snapshots.version < EXCLUDED.version
            ",
        )
        .bind(snapshot.stream_id.as_str())
        .bind(&snapshot.stream_type)
        .bind(snapshot.version)
        .bind(&snapshot.state)
        .bind(snapshot.taken_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("failed to save snapshot", &e))?;

        Ok(())
    }

    async fn delete(&self, stream_id: &StreamId) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM snapshots WHERE stream_id = $1")
            .bind(stream_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("failed to delete snapshot", &e))?;

        Ok(())
    }
}
