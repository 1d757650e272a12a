//! In-memory implementation of the `EventStore` trait.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use keel_core::error::DomainError;
use keel_core::event::{NewEvent, StoredEvent};
use keel_core::store::EventStore;
use keel_core::stream::{NO_VERSION, StreamId};
use keel_core::subscription::{EventBroadcaster, EventPublisher, EventSubscription};

use crate::poisoned;

#[derive(Debug, Default)]
struct EventLog {
    /// Every event in global sequence order; index `i` holds sequence `i + 1`.
    events: Vec<StoredEvent>,
    /// Indices into `events` per stream, in version order.
    streams: HashMap<StreamId, Vec<usize>>,
}

impl EventLog {
    fn stream_version(&self, stream_id: &StreamId) -> i64 {
        self.streams
            .get(stream_id)
            .and_then(|indices| indices.last())
            .map_or(NO_VERSION, |&index| self.events[index].version)
    }
}

/// Event store that keeps the whole log in process memory.
///
/// An append takes the log lock once, checks the expected version and
/// writes the batch without suspending, so it is all-or-nothing even when
/// the calling future is dropped.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    log: Mutex<EventLog>,
    broadcaster: EventBroadcaster,
}

impl InMemoryEventStore {
    /// Creates an empty store with a default-capacity broadcaster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that publishes through `broadcaster`.
    #[must_use]
    pub fn with_broadcaster(broadcaster: EventBroadcaster) -> Self {
        Self {
            log: Mutex::default(),
            broadcaster,
        }
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
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

        let stored = {
            let mut log = self.log.lock().map_err(|_| poisoned("event log"))?;
            let actual = log.stream_version(stream_id);
            if actual != expected_version {
                return Err(DomainError::ConcurrencyConflict {
                    stream_id: stream_id.clone(),
                    expected: expected_version,
                    actual,
                });
            }

            let mut stored = Vec::with_capacity(events.len());
            let mut version = expected_version;
            for event in events {
                version += 1;
                let index = log.events.len() + stored.len();
                let sequence_number = i64::try_from(index + 1).map_err(|_| {
                    DomainError::Infrastructure("event log sequence overflow".into())
                })?;
                stored.push(StoredEvent::from_new(
                    event,
                    stream_id.clone(),
                    stream_type,
                    version,
                    sequence_number,
                ));
            }
            for event in &stored {
                let index = log.events.len();
                log.events.push(event.clone());
                log.streams.entry(stream_id.clone()).or_default().push(index);
            }
            stored
        };

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

    async fn load_events(
        &self,
        stream_id: &StreamId,
        after_version: Option<i64>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let after_version = after_version.unwrap_or(NO_VERSION);
        let log = self.log.lock().map_err(|_| poisoned("event log"))?;
        let Some(indices) = log.streams.get(stream_id) else {
            return Ok(Vec::new());
        };
        Ok(indices
            .iter()
            .map(|&index| &log.events[index])
            .filter(|event| event.version > after_version)
            .cloned()
            .collect())
    }

    async fn stream_version(&self, stream_id: &StreamId) -> Result<i64, DomainError> {
        let log = self.log.lock().map_err(|_| poisoned("event log"))?;
        Ok(log.stream_version(stream_id))
    }

    async fn load_all(
        &self,
        after_sequence: i64,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let log = self.log.lock().map_err(|_| poisoned("event log"))?;
        let start = usize::try_from(after_sequence.max(0)).unwrap_or(usize::MAX);
        Ok(log.events.iter().skip(start).take(limit).cloned().collect())
    }

    fn subscribe(&self, stream_type: Option<&str>) -> EventSubscription {
        self.broadcaster.subscribe(stream_type)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use keel_test_support::RecordingPublisher;
    use uuid::Uuid;

    use super::*;

    fn new_event(event_type: &str) -> NewEvent {
        NewEvent {
            event_id: Uuid::new_v4(),
            event_type: event_type.to_owned(),
            payload: serde_json::json!({"key": "value"}),
            correlation_id: Uuid::new_v4(),
            causation_id: Uuid::new_v4(),
            occurred_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        }
    }

    // --- append_events ---

    #[tokio::test]
    async fn test_first_append_to_new_stream_starts_at_version_zero() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::from("order-1");

        let stored = store
            .append_events(&stream_id, "Order", -1, vec![new_event("Created")])
            .await
            .unwrap();

        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].version, 0);
        assert_eq!(stored[0].sequence_number, 1);
        assert_eq!(stored[0].stream_type, "Order");
    }

    #[tokio::test]
    async fn test_second_append_with_new_stream_version_conflicts() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::from("order-1");
        store
            .append_events(&stream_id, "Order", -1, vec![new_event("Created")])
            .await
            .unwrap();

        let result = store
            .append_events(&stream_id, "Order", -1, vec![new_event("Created")])
            .await;

        match result {
            Err(DomainError::ConcurrencyConflict {
                stream_id: conflict_stream,
                expected,
                actual,
            }) => {
                assert_eq!(conflict_stream, stream_id);
                assert_eq!(expected, -1);
                assert_eq!(actual, 0);
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_batch_versions_follow_input_order() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::from("order-1");
        store
            .append_events(&stream_id, "Order", -1, vec![new_event("A"), new_event("B")])
            .await
            .unwrap();

        let stored = store
            .append_events(
                &stream_id,
                "Order",
                1,
                vec![new_event("C"), new_event("D"), new_event("E")],
            )
            .await
            .unwrap();

        let versions: Vec<i64> = stored.iter().map(|e| e.version).collect();
        let types: Vec<&str> = stored.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(versions, vec![2, 3, 4]);
        assert_eq!(types, vec!["C", "D", "E"]);
    }

    #[tokio::test]
    async fn test_conflicting_batch_writes_nothing() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::from("order-1");
        store
            .append_events(&stream_id, "Order", -1, vec![new_event("A"), new_event("B")])
            .await
            .unwrap();

        let result = store
            .append_events(&stream_id, "Order", 0, vec![new_event("C"), new_event("D")])
            .await;

        assert!(matches!(
            result,
            Err(DomainError::ConcurrencyConflict {
                expected: 0,
                actual: 1,
                ..
            })
        ));
        assert_eq!(store.load_events(&stream_id, None).await.unwrap().len(), 2);
        assert_eq!(store.load_all(0, 100).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_appends_at_same_version_exactly_one_wins() {
        let store = Arc::new(InMemoryEventStore::new());
        let stream_id = StreamId::from("order-1");
        store
            .append_events(
                &stream_id,
                "Order",
                -1,
                vec![new_event("A"), new_event("B"), new_event("C")],
            )
            .await
            .unwrap();

        let first = {
            let store = Arc::clone(&store);
            let stream_id = stream_id.clone();
            tokio::spawn(async move {
                store
                    .append_events(&stream_id, "Order", 2, vec![new_event("D")])
                    .await
            })
        };
        let second = {
            let store = Arc::clone(&store);
            let stream_id = stream_id.clone();
            tokio::spawn(async move {
                store
                    .append_events(&stream_id, "Order", 2, vec![new_event("D")])
                    .await
            })
        };
        let results = [first.await.unwrap(), second.await.unwrap()];

        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        let conflict = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        match conflict {
            DomainError::ConcurrencyConflict {
                expected, actual, ..
            } => {
                assert_eq!(*expected, 2);
                assert_eq!(*actual, 3);
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
        assert_eq!(store.stream_version(&stream_id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_append_empty_events_is_noop() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::from("order-1");

        let stored = store
            .append_events(&stream_id, "Order", 7, Vec::new())
            .await
            .unwrap();

        assert!(stored.is_empty());
        assert_eq!(store.stream_version(&stream_id).await.unwrap(), -1);
    }

    // --- load_events ---

    #[tokio::test]
    async fn test_load_events_returns_empty_vec_for_unknown_stream() {
        let store = InMemoryEventStore::new();

        let events = store
            .load_events(&StreamId::from("missing"), None)
            .await
            .unwrap();

        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_load_events_after_version_skips_earlier_events() {
        let store = InMemoryEventStore::new();
        let stream_id = StreamId::from("order-1");
        store
            .append_events(
                &stream_id,
                "Order",
                -1,
                vec![new_event("A"), new_event("B"), new_event("C")],
            )
            .await
            .unwrap();

        let events = store.load_events(&stream_id, Some(0)).await.unwrap();

        let versions: Vec<i64> = events.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_streams_are_isolated() {
        let store = InMemoryEventStore::new();
        let order = StreamId::from("order-1");
        let payment = StreamId::from("payment-1");

        store
            .append_events(&order, "Order", -1, vec![new_event("A")])
            .await
            .unwrap();
        store
            .append_events(&payment, "Payment", -1, vec![new_event("B")])
            .await
            .unwrap();

        let orders = store.load_events(&order, None).await.unwrap();
        let payments = store.load_events(&payment, None).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(payments.len(), 1);
        assert_eq!(orders[0].version, 0);
        assert_eq!(payments[0].version, 0);
        assert_eq!(payments[0].sequence_number, 2);
    }

    // --- load_all ---

    #[tokio::test]
    async fn test_load_all_pages_in_global_sequence_order() {
        let store = InMemoryEventStore::new();
        for n in 0..5 {
            let stream_id = StreamId::from(format!("order-{n}"));
            store
                .append_events(&stream_id, "Order", -1, vec![new_event("A")])
                .await
                .unwrap();
        }

        let first_page = store.load_all(0, 2).await.unwrap();
        let second_page = store.load_all(2, 10).await.unwrap();

        let first: Vec<i64> = first_page.iter().map(|e| e.sequence_number).collect();
        let second: Vec<i64> = second_page.iter().map(|e| e.sequence_number).collect();
        assert_eq!(first, vec![1, 2]);
        assert_eq!(second, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn test_batch_events_get_consecutive_sequence_numbers() {
        // Arrange
        let store = InMemoryEventStore::new();
        let order = StreamId::from("order-1");
        let payment = StreamId::from("payment-1");

        // Act
        let batch = store
            .append_events(
                &order,
                "Order",
                -1,
                vec![new_event("A"), new_event("B"), new_event("C")],
            )
            .await
            .unwrap();
        let next = store
            .append_events(&payment, "Payment", -1, vec![new_event("D")])
            .await
            .unwrap();

        // Assert
        let batch_sequences: Vec<i64> = batch.iter().map(|e| e.sequence_number).collect();
        assert_eq!(batch_sequences, vec![1, 2, 3]);
        assert_eq!(next[0].sequence_number, 4);
        let after_first: Vec<i64> = store
            .load_all(1, 10)
            .await
            .unwrap()
            .iter()
            .map(|e| e.sequence_number)
            .collect();
        assert_eq!(after_first, vec![2, 3, 4]);
    }

    // --- publishing ---

    #[tokio::test]
    async fn test_committed_events_reach_subscribers_and_publishers() {
        let publisher = Arc::new(RecordingPublisher::default());
        let store = InMemoryEventStore::with_broadcaster(
            EventBroadcaster::new(16).with_publisher(publisher.clone()),
        );
        let mut payments = store.subscribe(Some("Payment"));
        let stream_id = StreamId::from("payment-1");

        store
            .append_events(&stream_id, "Payment", -1, vec![new_event("Authorized")])
            .await
            .unwrap();
        store
            .append_events(&StreamId::from("order-1"), "Order", -1, vec![new_event("A")])
            .await
            .unwrap();

        let received = payments.recv().await.unwrap();
        assert_eq!(received.stream_id, stream_id);
        assert_eq!(received.event_type, "Authorized");
        assert_eq!(publisher.published().len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_append_publishes_nothing() {
        let publisher = Arc::new(RecordingPublisher::default());
        let store = InMemoryEventStore::with_broadcaster(
            EventBroadcaster::new(16).with_publisher(publisher.clone()),
        );
        let stream_id = StreamId::from("order-1");

        let result = store
            .append_events(&stream_id, "Order", 3, vec![new_event("A")])
            .await;

        assert!(result.is_err());
        assert!(publisher.published().is_empty());
    }
}
