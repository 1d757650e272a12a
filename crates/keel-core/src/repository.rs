//! Aggregate persistence orchestration.
//!
//! The repository hydrates aggregates from the latest snapshot plus the
//! events stored after it, and saves them by appending their uncommitted
//! events with the version they were loaded at as the expected version.
//! That expected-version check is the only mutual exclusion: no lock is
//! held between `load` and `save`.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::aggregate::{Aggregate, AggregateRoot};
use crate::clock::{SharedClock, SystemClock};
use crate::config::RepositoryConfig;
use crate::error::DomainError;
use crate::event::StoredEvent;
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::store::EventStore;
use crate::stream::StreamId;

/// Loads and saves aggregates of type `A`.
pub struct AggregateRepository<A: Aggregate> {
    events: Arc<dyn EventStore>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    config: RepositoryConfig,
    clock: SharedClock,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A: Aggregate> Clone for AggregateRepository<A> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
            snapshots: self.snapshots.clone(),
            config: self.config,
            clock: Arc::clone(&self.clock),
            _aggregate: PhantomData,
        }
    }
}

impl<A: Aggregate> std::fmt::Debug for AggregateRepository<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateRepository")
            .field("stream_type", &A::STREAM_TYPE)
            .field("snapshots", &self.snapshots.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<A: Aggregate> AggregateRepository<A> {
    /// Creates a repository without snapshot support.
    #[must_use]
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        Self {
            events,
            snapshots: None,
            config: RepositoryConfig::without_snapshots(),
            clock: SystemClock::shared(),
            _aggregate: PhantomData,
        }
    }

    /// Enables snapshotting with the given store and configuration.
    #[must_use]
    pub fn with_snapshots(
        mut self,
        snapshots: Arc<dyn SnapshotStore>,
        config: RepositoryConfig,
    ) -> Self {
        self.snapshots = Some(snapshots);
        self.config = config;
        self
    }

    /// Overrides the clock used to timestamp snapshots.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the underlying event store.
    #[must_use]
    pub fn event_store(&self) -> &Arc<dyn EventStore> {
        &self.events
    }

    /// Loads an aggregate, or `None` if the stream has neither a snapshot
    /// nor events.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the event store fails or the
    /// history is inconsistent, and `DomainError::Serialization` if an event
    /// cannot be decoded.
    #[tracing::instrument(skip(self), fields(stream_type = A::STREAM_TYPE))]
    pub async fn load(&self, id: &StreamId) -> Result<Option<AggregateRoot<A>>, DomainError> {
        let snapshot = self.latest_snapshot(id).await;
        let after_version = snapshot.as_ref().map(|(_, version)| *version);
        let events = self.events.load_events(id, after_version).await?;

        let mut root = match snapshot {
            Some((root, _)) => root,
            None if events.is_empty() => return Ok(None),
            None => AggregateRoot::new(id.clone()),
        };
        for stored in &events {
            root.replay(stored)?;
        }

        tracing::debug!(
            stream_id = %id,
            version = root.version(),
            replayed = events.len(),
            from_snapshot = after_version.is_some(),
            "aggregate loaded"
        );
        Ok(Some(root))
    }

    /// Loads an aggregate that must exist.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if the stream is empty, plus
    /// every error [`load`](Self::load) can return.
    pub async fn get(&self, id: &StreamId) -> Result<AggregateRoot<A>, DomainError> {
        self.load(id)
            .await?
            .ok_or_else(|| DomainError::AggregateNotFound(id.clone()))
    }

    /// Persists the aggregate's uncommitted events.
    ///
    /// On success the aggregate's version advances and its uncommitted list
    /// is cleared. On failure the aggregate is left untouched, so the caller
    /// can reload and retry after a `ConcurrencyConflict`.
    ///
    /// # Errors
    ///
    /// Returns the event store's error unchanged.
    #[tracing::instrument(skip(self, root), fields(stream_type = A::STREAM_TYPE, stream_id = %root.id()))]
    pub async fn save(&self, root: &mut AggregateRoot<A>) -> Result<Vec<StoredEvent>, DomainError> {
        if !root.has_uncommitted_events() {
            return Ok(Vec::new());
        }

        let old_version = root.version();
        let new_events = root.new_events()?;
        let stored = self
            .events
            .append_events(root.id(), A::STREAM_TYPE, old_version, new_events)
            .await?;

        let new_version = stored.last().map_or(old_version, |event| event.version);
        root.mark_committed(new_version);
        tracing::debug!(old_version, new_version, "aggregate saved");

        if self.config.crosses_snapshot_boundary(old_version, new_version) {
            self.take_snapshot(root).await;
        }
        Ok(stored)
    }

    async fn latest_snapshot(&self, id: &StreamId) -> Option<(AggregateRoot<A>, i64)> {
        let store = self.snapshots.as_ref()?;
        let snapshot = match store.load(id).await {
            Ok(snapshot) => snapshot?,
            Err(error) => {
                tracing::warn!(stream_id = %id, %error, "snapshot load failed; replaying full stream");
                return None;
            }
        };
        Self::restore(&snapshot).map(|root| (root, snapshot.version))
    }

    fn restore(snapshot: &Snapshot) -> Option<AggregateRoot<A>> {
        match AggregateRoot::from_snapshot(snapshot) {
            Ok(root) => Some(root),
            Err(error) => {
                tracing::warn!(
                    stream_id = %snapshot.stream_id,
                    version = snapshot.version,
                    %error,
                    "snapshot does not decode; treating as cache miss"
                );
                None
            }
        }
    }

    async fn take_snapshot(&self, root: &AggregateRoot<A>) {
        let Some(store) = &self.snapshots else {
            return;
        };
        let stream_id = root.id().clone();
        let version = root.version();
        let snapshot = match root.to_snapshot(self.clock.now()) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::warn!(%stream_id, version, %error, "snapshot encode failed; continuing without it");
                return;
            }
        };

        // Detached: a write still pending at `snapshot_timeout` finishes in
        // the background.
        let store = Arc::clone(store);
        let write = tokio::spawn(async move { store.save(snapshot).await });
        match tokio::time::timeout(self.config.snapshot_timeout, write).await {
            Ok(Ok(Ok(()))) => tracing::debug!(%stream_id, version, "snapshot saved"),
            Ok(Ok(Err(error))) => {
                tracing::warn!(%stream_id, version, %error, "snapshot save failed; continuing without it");
            }
            Ok(Err(error)) => {
                tracing::warn!(%stream_id, version, %error, "snapshot task aborted; continuing without it");
            }
            Err(_) => tracing::warn!(
                %stream_id,
                version,
                timeout_ms = u64::try_from(self.config.snapshot_timeout.as_millis()).unwrap_or(u64::MAX),
                "snapshot save still pending; not waiting for it"
            ),
        }
    }
}
