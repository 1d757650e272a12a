//! `PostgreSQL` implementation of the `EventStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keel_core::error::DomainError;
use keel_core::event::{NewEvent, StoredEvent};
use keel_core::store::EventStore;
use keel_core::stream::{NO_VERSION, StreamId};
use keel_core::subscription::{EventBroadcaster, EventPublisher, EventSubscription};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::db_error;

/// Unique constraint that arbitrates concurrent appends to one stream.
const STREAM_VERSION_CONSTRAINT: &str = "events_stream_version_unique";

const SELECT_EVENT_COLUMNS: &str = "SELECT sequence_number, event_id, stream_id, stream_type, version, \
     event_type, payload, correlation_id, causation_id, occurred_at FROM events";

#[derive(Debug, FromRow)]
struct EventRow {
    sequence_number: i64,
    event_id: Uuid,
    stream_id: String,
    stream_type: String,
    version: i64,
    event_type: String,
    payload: serde_json::Value,
    correlation_id: Uuid,
    causation_id: Uuid,
    occurred_at: DateTime<Utc>,
}

impl From<EventRow> for StoredEvent {
    fn from(row: EventRow) -> Self {
        Self {
            sequence_number: row.sequence_number,
            event_id: row.event_id,
            stream_id: StreamId::new(row.stream_id),
            stream_type: row.stream_type,
            version: row.version,
            event_type: row.event_type,
            payload: row.payload,
            correlation_id: row.correlation_id,
            causation_id: row.causation_id,
            occurred_at: row.occurred_at,
        }
    }
}

/// PostgreSQL-backed event store.
///
/// Each append runs in one transaction: the current stream version is read,
/// compared with the expected version, and the batch inserted. Two writers
/// that pass the read concurrently collide on the `(stream_id, version)`
/// unique constraint; the loser's transaction rolls back and is reported as
/// a concurrency conflict. Dropping an in-flight append drops its
/// transaction, which rolls back, so a cancelled append never partially
/// commits.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
    broadcaster: EventBroadcaster,
}

impl PgEventStore {
    /// Creates a new `PgEventStore` with a default-capacity broadcaster.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_broadcaster(pool, EventBroadcaster::default())
    }

    /// Creates a new `PgEventStore` that publishes through `broadcaster`.
    #[must_use]
    pub fn with_broadcaster(pool: PgPool, broadcaster: EventBroadcaster) -> Self {
        Self { pool, broadcaster }
    }

    async fn insert_batch(
        tx: &mut Transaction<'_, Postgres>,
        stream_id: &StreamId,
        stream_type: &str,
        expected_version: i64,
        events: Vec<NewEvent>,
    ) -> Result<Vec<StoredEvent>, sqlx::Error> {
        let mut stored = Vec::with_capacity(events.len());
        let mut version = expected_version;
        for event in events {
            version += 1;
            let sequence_number: i64 = sqlx::query_scalar(
                r"
                INSERT INTO events (
                    event_id, stream_id, stream_type, version, event_type,
                    payload, correlation_id, causation_id, occurred_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING sequence_number
                ",
            )
            .bind(event.event_id)
            .bind(stream_id.as_str())
            .bind(stream_type)
            .bind(version)
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(event.correlation_id)
            .bind(event.causation_id)
            .bind(event.occurred_at)
            .fetch_one(&mut **tx)
            .await?;

            stored.push(StoredEvent::from_new(
                event,
                stream_id.clone(),
                stream_type,
                version,
                sequence_number,
            ));
        }
        Ok(stored)
    }
}

fn is_stream_version_violation(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|db| {
        db.is_unique_violation() && db.constraint() == Some(STREAM_VERSION_CONSTRAINT)
    })
}

#[async_trait]
impl EventStore for PgEventStore {
    #[tracing::instrument(skip(self, events), fields(count = events.len()))]
    async fn append_events(
        &self,
        stream_id: &StreamId,
        stream_type: &str,
        expected_version: i64,
        events: Vec<NewEvent>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("failed to start transaction", &e))?;

        let actual: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version), -1) FROM events WHERE stream_id = $1",
        )
        .bind(stream_id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("failed to read stream version", &e))?;

        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                stream_id: stream_id.clone(),
                expected: expected_version,
                actual,
            });
        }

        let inserted =
            Self::insert_batch(&mut tx, stream_id, stream_type, expected_version, events).await;
        let stored = match inserted {
            Ok(stored) => stored,
            Err(e) if is_stream_version_violation(&e) => {
                drop(tx);
                let actual = self.stream_version(stream_id).await?;
                return Err(DomainError::ConcurrencyConflict {
                    stream_id: stream_id.clone(),
                    expected: expected_version,
                    actual,
                });
            }
            Err(e) => return Err(db_error("failed to insert events", &e)),
        };

        tx.commit()
            .await
            .map_err(|e| db_error("failed to commit events", &e))?;

        tracing::debug!(
            stream_id = %stream_id,
            stream_type,
            expected_version,
            appended = stored.len(),
            "events appended"
        );
        for event in &stored {
            self.broadcaster.publish(event);
        }
        Ok(stored)
    }

    #[tracing::instrument(skip(self))]
    async fn load_events(
        &self,
        stream_id: &StreamId,
        after_version: Option<i64>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "{SELECT_EVENT_COLUMNS} WHERE stream_id = $1 AND version > $2 ORDER BY version"
        ))
        .bind(stream_id.as_str())
        .bind(after_version.unwrap_or(NO_VERSION))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("failed to load events", &e))?;

        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }

    async fn stream_version(&self, stream_id: &StreamId) -> Result<i64, DomainError> {
        sqlx::query_scalar("SELECT COALESCE(MAX(version), -1) FROM events WHERE stream_id = $1")
            .bind(stream_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("failed to read stream version", &e))
    }

    #[tracing::instrument(skip(self))]
    async fn load_all(
        &self,
        after_sequence: i64,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "{SELECT_EVENT_COLUMNS} WHERE sequence_number > $1 ORDER BY sequence_number LIMIT $2"
        ))
        .bind(after_sequence)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("failed to load event log", &e))?;

        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }

    fn subscribe(&self, stream_type: Option<&str>) -> EventSubscription {
        self.broadcaster.subscribe(stream_type)
    }
}
