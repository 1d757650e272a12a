//! Event audit trail: every committed event is written to the log.

use keel_core::event::StoredEvent;
use keel_core::subscription::{EventPublisher, EventSubscription};
use tracing::{debug, info};

/// Publisher that traces each committed event at `debug` as it is handed
/// to the broadcaster.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPublisher;

impl EventPublisher for TracingPublisher {
    fn publish(&self, event: &StoredEvent) {
        debug!(
            sequence_number = event.sequence_number,
            stream_id = %event.stream_id,
            event_type = %event.event_type,
            "event published"
        );
    }
}

/// Drains `subscription`, logging one audit line per event. Returns the
/// number of events seen once the owning store is dropped.
pub async fn run_audit(mut subscription: EventSubscription) -> u64 {
    let mut seen = 0;
    while let Some(event) = subscription.recv().await {
        seen += 1;
        info!(
            sequence_number = event.sequence_number,
            stream_id = %event.stream_id,
            stream_type = %event.stream_type,
            version = event.version,
            event_type = %event.event_type,
            correlation_id = %event.correlation_id,
            "audit"
        );
    }
    seen
}

#[cfg(test)]
mod tests {
    use keel_core::stream::StreamId;
    use keel_core::subscription::EventBroadcaster;
    use uuid::Uuid;

    use super::*;

    fn stored(sequence_number: i64, stream_type: &str) -> StoredEvent {
        StoredEvent {
            sequence_number,
            event_id: Uuid::new_v4(),
            stream_id: StreamId::from("order-1"),
            stream_type: stream_type.to_owned(),
            version: sequence_number - 1,
            event_type: "order.created".to_owned(),
            payload: serde_json::json!({}),
            correlation_id: Uuid::new_v4(),
            causation_id: Uuid::new_v4(),
            occurred_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_audit_counts_events_until_store_goes_away() {
        // Arrange
        let broadcaster =
            EventBroadcaster::new(8).with_publisher(std::sync::Arc::new(TracingPublisher));
        let subscription = broadcaster.subscribe(None);
        broadcaster.publish(&stored(1, "Order"));
        broadcaster.publish(&stored(2, "Payment"));

        // Act
        drop(broadcaster);
        let seen = run_audit(subscription).await;

        // Assert
        assert_eq!(seen, 2);
    }
}
