//! Event store abstraction.

use async_trait::async_trait;

use crate::error::DomainError;
use crate::event::{NewEvent, StoredEvent};
use crate::stream::StreamId;
use crate::subscription::EventSubscription;

/// Append-only, per-stream ordered event log with optimistic concurrency.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a batch of events to a stream.
    ///
    /// `expected_version` is the version the caller believes the stream is
    /// at (`-1` for a brand-new stream). The batch is written only if it
    /// matches the stored version, and then in full: events receive versions
    /// `expected_version + 1, + 2, ...` in input order plus a store-wide
    /// sequence number. Committed events are published to subscribers after
    /// the write. An empty batch is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if the stream has moved on,
    /// or `DomainError::Infrastructure` if the backend fails. Nothing is
    /// written in either case.
    async fn append_events(
        &self,
        stream_id: &StreamId,
        stream_type: &str,
        expected_version: i64,
        events: Vec<NewEvent>,
    ) -> Result<Vec<StoredEvent>, DomainError>;

    /// Loads a stream's events ordered by version.
    ///
    /// With `after_version` set only events with a greater version are
    /// returned. Unknown streams yield an empty list.
    async fn load_events(
        &self,
        stream_id: &StreamId,
        after_version: Option<i64>,
    ) -> Result<Vec<StoredEvent>, DomainError>;

    /// Returns the stream's current version, `-1` if it has no events.
    async fn stream_version(&self, stream_id: &StreamId) -> Result<i64, DomainError>;

    /// Pages through every stream in global sequence order, starting after
    /// `after_sequence` (use `0` to start from the beginning).
    async fn load_all(
        &self,
        after_sequence: i64,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, DomainError>;

    /// Opens a live subscription to events appended from now on, optionally
    /// narrowed to one stream type.
    fn subscribe(&self, stream_type: Option<&str>) -> EventSubscription;
}
