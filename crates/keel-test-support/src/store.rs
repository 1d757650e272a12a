//! Failing storage doubles for error-path tests.

use async_trait::async_trait;
use keel_core::error::DomainError;
use keel_core::event::{NewEvent, StoredEvent};
use keel_core::snapshot::{Snapshot, SnapshotStore};
use keel_core::store::EventStore;
use keel_core::stream::StreamId;
use keel_core::subscription::{EventBroadcaster, EventSubscription};

fn connection_refused() -> DomainError {
    DomainError::Infrastructure("connection refused".into())
}

/// An event store whose reads and writes always fail with an
/// infrastructure error. Subscriptions open but never yield.
#[derive(Debug, Default)]
pub struct FailingEventStore {
    broadcaster: EventBroadcaster,
}

#[async_trait]
impl EventStore for FailingEventStore {
    async fn append_events(
        &self,
        _stream_id: &StreamId,
        _stream_type: &str,
        _expected_version: i64,
        _events: Vec<NewEvent>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Err(connection_refused())
    }

    async fn load_events(
        &self,
        _stream_id: &StreamId,
        _after_version: Option<i64>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Err(connection_refused())
    }

    async fn stream_version(&self, _stream_id: &StreamId) -> Result<i64, DomainError> {
        Err(connection_refused())
    }

    async fn load_all(
        &self,
        _after_sequence: i64,
        _limit: usize,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Err(connection_refused())
    }

    fn subscribe(&self, stream_type: Option<&str>) -> EventSubscription {
        self.broadcaster.subscribe(stream_type)
    }
}

/// A snapshot store that always fails. Used to check that snapshot
/// problems never fail a load or a save.
#[derive(Debug, Default)]
pub struct FailingSnapshotStore;

#[async_trait]
impl SnapshotStore for FailingSnapshotStore {
    async fn load(&self, _stream_id: &StreamId) -> Result<Option<Snapshot>, DomainError> {
        Err(connection_refused())
    }

    async fn save(&self, _snapshot: Snapshot) -> Result<(), DomainError> {
        Err(connection_refused())
    }

    async fn delete(&self, _stream_id: &StreamId) -> Result<(), DomainError> {
        Err(connection_refused())
    }
}

/// A snapshot store whose writes never complete. Reads find nothing.
#[derive(Debug, Default)]
pub struct HangingSnapshotStore;

#[async_trait]
impl SnapshotStore for HangingSnapshotStore {
    async fn load(&self, _stream_id: &StreamId) -> Result<Option<Snapshot>, DomainError> {
        Ok(None)
    }

    async fn save(&self, _snapshot: Snapshot) -> Result<(), DomainError> {
        std::future::pending().await
    }

    async fn delete(&self, _stream_id: &StreamId) -> Result<(), DomainError> {
        Ok(())
    }
}
