//! In-memory implementation of the `SnapshotStore` trait.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use keel_core::error::DomainError;
use keel_core::snapshot::{Snapshot, SnapshotStore};
use keel_core::stream::StreamId;

use crate::poisoned;

/// Snapshot store backed by a `HashMap` keyed by stream.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: Mutex<HashMap<StreamId, Snapshot>>,
}

impl InMemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of streams with a stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the lock is poisoned.
    pub fn len(&self) -> Result<usize, DomainError> {
        Ok(self
            .snapshots
            .lock()
            .map_err(|_| poisoned("snapshot store"))?
            .len())
    }

    /// Returns `true` if no snapshot is stored.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, DomainError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self, stream_id: &StreamId) -> Result<Option<Snapshot>, DomainError> {
        let snapshots = self.snapshots.lock().map_err(|_| poisoned("snapshot store"))?;
        Ok(snapshots.get(stream_id).cloned())
    }

    async fn save(&self, snapshot: Snapshot) -> Result<(), DomainError> {
        let mut snapshots = self.snapshots.lock().map_err(|_| poisoned("snapshot store"))?;
        let is_newer = snapshots
            .get(&snapshot.stream_id)
            .is_none_or(|existing| existing.version < snapshot.version);
        if is_newer {
            snapshots.insert(snapshot.stream_id.clone(), snapshot);
        }
        Ok(())
    }

    async fn delete(&self, stream_id: &StreamId) -> Result<(), DomainError> {
        let mut snapshots = self.snapshots.lock().map_err(|_| poisoned("snapshot store"))?;
        snapshots.remove(stream_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn snapshot(version: i64, value: u64) -> Snapshot {
        Snapshot {
            stream_id: StreamId::from("order-1"),
            stream_type: "Order".to_owned(),
            version,
            state: serde_json::json!({ "value": value }),
            taken_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_load_returns_latest_saved_snapshot() {
        let store = InMemorySnapshotStore::new();

        store.save(snapshot(9, 1)).await.unwrap();
        store.save(snapshot(19, 2)).await.unwrap();

        let loaded = store.load(&StreamId::from("order-1")).await.unwrap().unwrap();
        assert_eq!(loaded.version, 19);
        assert_eq!(loaded.state, serde_json::json!({ "value": 2 }));
    }

    #[tokio::test]
    async fn test_older_snapshot_does_not_replace_newer() {
        let store = InMemorySnapshotStore::new();

        store.save(snapshot(19, 2)).await.unwrap();
        store.save(snapshot(9, 1)).await.unwrap();

        let loaded = store.load(&StreamId::from("order-1")).await.unwrap().unwrap();
        assert_eq!(loaded.version, 19);
    }

    #[tokio::test]
    async fn test_delete_removes_snapshot() {
        let store = InMemorySnapshotStore::new();
        store.save(snapshot(9, 1)).await.unwrap();

        store.delete(&StreamId::from("order-1")).await.unwrap();

        assert!(store.load(&StreamId::from("order-1")).await.unwrap().is_none());
        assert!(store.is_empty().unwrap());
    }
}
