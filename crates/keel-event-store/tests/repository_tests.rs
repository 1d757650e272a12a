//! `AggregateRepository` behaviour against the in-memory stores.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use keel_core::aggregate::{Aggregate, AggregateRoot};
use keel_core::command::Command;
use keel_core::config::RepositoryConfig;
use keel_core::error::DomainError;
use keel_core::event::DomainEvent;
use keel_core::repository::AggregateRepository;
use keel_core::snapshot::{Snapshot, SnapshotStore};
use keel_core::store::EventStore;
use keel_core::stream::StreamId;
use keel_event_store::{InMemoryEventStore, InMemorySnapshotStore};
use keel_test_support::{FailingSnapshotStore, FixedClock, HangingSnapshotStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum TallyEvent {
    Added { amount: i64 },
}

impl DomainEvent for TallyEvent {
    fn event_type(&self) -> &'static str {
        "tally.added"
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Tally {
    total: i64,
    entries: Vec<i64>,
}

impl Aggregate for Tally {
    const STREAM_TYPE: &'static str = "Tally";
    type Event = TallyEvent;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TallyEvent::Added { amount } => {
                self.total += amount;
                self.entries.push(*amount);
            }
        }
    }
}

#[derive(Debug)]
struct Add(i64);

impl Command for Add {
    fn command_type(&self) -> &'static str {
        "tally.add"
    }

    fn correlation_id(&self) -> Uuid {
        Uuid::nil()
    }
}

fn add(root: &mut AggregateRoot<Tally>, amount: i64) {
    root.execute(&Add(amount), &FixedClock::epoch(), |_| {
        Ok(vec![TallyEvent::Added { amount }])
    })
    .unwrap();
}

/// Saves `count` events one at a time, amounts 1..=count.
async fn save_one_by_one(repo: &AggregateRepository<Tally>, id: &StreamId, count: i64) {
    for amount in 1..=count {
        let mut root = repo
            .load(id)
            .await
            .unwrap()
            .unwrap_or_else(|| AggregateRoot::new(id.clone()));
        add(&mut root, amount);
        repo.save(&mut root).await.unwrap();
    }
}

fn snapshotting_repo(
    events: &Arc<InMemoryEventStore>,
    snapshots: Arc<dyn SnapshotStore>,
    interval: u64,
) -> AggregateRepository<Tally> {
    AggregateRepository::new(events.clone())
        .with_snapshots(
            snapshots,
            RepositoryConfig {
                snapshot_interval: interval,
                snapshot_timeout: Duration::from_millis(50),
            },
        )
        .with_clock(FixedClock::epoch().shared())
}

// --- load / get ---

#[tokio::test]
async fn test_load_unknown_stream_returns_none() {
    let repo: AggregateRepository<Tally> =
        AggregateRepository::new(Arc::new(InMemoryEventStore::new()));

    let loaded = repo.load(&StreamId::from("tally-1")).await.unwrap();

    assert!(loaded.is_none());
}

#[tokio::test]
async fn test_get_unknown_stream_returns_not_found() {
    let repo: AggregateRepository<Tally> =
        AggregateRepository::new(Arc::new(InMemoryEventStore::new()));

    let result = repo.get(&StreamId::from("tally-1")).await;

    assert!(matches!(result, Err(DomainError::AggregateNotFound(id)) if id.as_str() == "tally-1"));
}

// --- save ---

#[tokio::test]
async fn test_save_then_load_round_trips_state_and_version() {
    // Arrange
    let repo: AggregateRepository<Tally> =
        AggregateRepository::new(Arc::new(InMemoryEventStore::new()));
    let id = StreamId::from("tally-1");
    let mut root = AggregateRoot::new(id.clone());
    add(&mut root, 5);
    add(&mut root, 7);

    // Act
    let stored = repo.save(&mut root).await.unwrap();

    // Assert
    assert_eq!(stored.len(), 2);
    assert_eq!(root.version(), 1);
    assert!(!root.has_uncommitted_events());
    let loaded = repo.get(&id).await.unwrap();
    assert_eq!(loaded.version(), 1);
    assert_eq!(loaded.state(), root.state());
}

#[tokio::test]
async fn test_save_without_changes_is_a_no_op() {
    let store = Arc::new(InMemoryEventStore::new());
    let repo: AggregateRepository<Tally> = AggregateRepository::new(store.clone());
    let mut root = AggregateRoot::new("tally-1");

    let stored = repo.save(&mut root).await.unwrap();

    assert!(stored.is_empty());
    assert_eq!(store.stream_version(root.id()).await.unwrap(), -1);
}

#[tokio::test]
async fn test_conflicting_save_leaves_aggregate_untouched() {
    // Arrange
    let repo: AggregateRepository<Tally> =
        AggregateRepository::new(Arc::new(InMemoryEventStore::new()));
    let id = StreamId::from("tally-1");
    save_one_by_one(&repo, &id, 1).await;
    let mut first = repo.get(&id).await.unwrap();
    let mut second = repo.get(&id).await.unwrap();
    add(&mut first, 10);
    repo.save(&mut first).await.unwrap();

    // Act
    add(&mut second, 20);
    let result = repo.save(&mut second).await;

    // Assert
    match result {
        Err(DomainError::ConcurrencyConflict {
            expected, actual, ..
        }) => {
            assert_eq!(expected, 0);
            assert_eq!(actual, 1);
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
    assert_eq!(second.version(), 0);
    assert_eq!(second.uncommitted_events().len(), 1);
    assert_eq!(second.state().total, 21);
    let reloaded = repo.get(&id).await.unwrap();
    assert_eq!(reloaded.state().entries, vec![1, 10]);
}

// --- snapshots ---

#[tokio::test]
async fn test_snapshot_is_taken_when_crossing_interval_boundary() {
    // Arrange
    let events = Arc::new(InMemoryEventStore::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let repo = snapshotting_repo(&events, snapshots.clone(), 10);
    let id = StreamId::from("tally-1");

    // Act
    save_one_by_one(&repo, &id, 9).await;
    let before_boundary = snapshots.load(&id).await.unwrap();
    save_one_by_one(&repo, &id, 1).await;

    // Assert
    assert!(before_boundary.is_none());
    let snapshot = snapshots.load(&id).await.unwrap().unwrap();
    assert_eq!(snapshot.version, 9);
    assert_eq!(snapshot.stream_type, "Tally");
    assert_eq!(snapshot.taken_at, FixedClock::epoch().0);
}

#[tokio::test]
async fn test_snapshot_plus_delta_equals_full_replay() {
    // Arrange
    let events = Arc::new(InMemoryEventStore::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let repo = snapshotting_repo(&events, snapshots.clone(), 11);
    let plain: AggregateRepository<Tally> = AggregateRepository::new(events.clone());
    let id = StreamId::from("tally-1");
    save_one_by_one(&repo, &id, 16).await;

    // Act
    let from_snapshot = repo.get(&id).await.unwrap();
    let from_scratch = plain.get(&id).await.unwrap();

    // Assert
    assert_eq!(snapshots.load(&id).await.unwrap().unwrap().version, 10);
    assert_eq!(from_snapshot.version(), 15);
    assert_eq!(from_snapshot.version(), from_scratch.version());
    assert_eq!(from_snapshot.state(), from_scratch.state());
}

#[tokio::test]
async fn test_deleting_snapshots_does_not_change_loaded_state() {
    let events = Arc::new(InMemoryEventStore::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let repo = snapshotting_repo(&events, snapshots.clone(), 5);
    let id = StreamId::from("tally-1");
    save_one_by_one(&repo, &id, 12).await;
    let with_snapshot = repo.get(&id).await.unwrap();

    snapshots.delete(&id).await.unwrap();
    let without_snapshot = repo.get(&id).await.unwrap();

    assert_eq!(without_snapshot.state(), with_snapshot.state());
    assert_eq!(without_snapshot.version(), with_snapshot.version());
}

#[tokio::test]
async fn test_corrupt_snapshot_falls_back_to_full_replay() {
    // Arrange
    let events = Arc::new(InMemoryEventStore::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let repo = snapshotting_repo(&events, snapshots.clone(), 0);
    let id = StreamId::from("tally-1");
    save_one_by_one(&repo, &id, 3).await;
    snapshots
        .save(Snapshot {
            stream_id: id.clone(),
            stream_type: "Tally".to_owned(),
            version: 1,
            state: serde_json::json!({ "unexpected": true }),
            taken_at: Utc::now(),
        })
        .await
        .unwrap();

    // Act
    let loaded = repo.get(&id).await.unwrap();

    // Assert
    assert_eq!(loaded.version(), 2);
    assert_eq!(loaded.state().entries, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_failing_snapshot_store_never_fails_load_or_save() {
    let events = Arc::new(InMemoryEventStore::new());
    let repo = snapshotting_repo(&events, Arc::new(FailingSnapshotStore), 1);
    let id = StreamId::from("tally-1");

    save_one_by_one(&repo, &id, 3).await;
    let loaded = repo.get(&id).await.unwrap();

    assert_eq!(loaded.version(), 2);
    assert_eq!(loaded.state().total, 6);
}

#[tokio::test]
async fn test_hanging_snapshot_store_does_not_hold_up_save() {
    // Arrange
    let events = Arc::new(InMemoryEventStore::new());
    let repo = snapshotting_repo(&events, Arc::new(HangingSnapshotStore), 1);
    let id = StreamId::from("tally-1");
    let mut root = AggregateRoot::new(id.clone());
    add(&mut root, 4);

    // Act
    let saved = tokio::time::timeout(Duration::from_secs(2), repo.save(&mut root)).await;

    // Assert
    let stored = saved.expect("save waited on the snapshot write").unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(root.version(), 0);
    assert_eq!(events.stream_version(&id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_zero_interval_disables_snapshots() {
    let events = Arc::new(InMemoryEventStore::new());
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let repo = snapshotting_repo(&events, snapshots.clone(), 0);

    save_one_by_one(&repo, &StreamId::from("tally-1"), 25).await;

    assert!(snapshots.is_empty().unwrap());
}
