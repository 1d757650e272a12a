//! Snapshot abstraction.
//!
//! Snapshots are a derived, optional cache of aggregate state. Loading with
//! every snapshot deleted must produce the same aggregate as loading with
//! them, only slower.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::stream::StreamId;

/// A point-in-time capture of one stream's aggregate state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The stream the state was folded from.
    pub stream_id: StreamId,
    /// Logical aggregate type of the stream.
    pub stream_type: String,
    /// Version of the last event folded into `state`.
    pub version: i64,
    /// Serialized aggregate state.
    pub state: serde_json::Value,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

/// Key-value persistence for the latest snapshot of each stream.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Loads the latest snapshot for a stream, if any.
    async fn load(&self, stream_id: &StreamId) -> Result<Option<Snapshot>, DomainError>;

    /// Stores a snapshot, replacing any older one for the same stream.
    ///
    /// A snapshot older than the one already stored is ignored.
    async fn save(&self, snapshot: Snapshot) -> Result<(), DomainError>;

    /// Removes the snapshot for a stream. Unknown streams are a no-op.
    async fn delete(&self, stream_id: &StreamId) -> Result<(), DomainError>;
}
