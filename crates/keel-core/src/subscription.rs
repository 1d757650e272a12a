//! Live fan-out of newly stored events.
//!
//! Every event store owns one [`EventBroadcaster`]. After an append commits,
//! the store hands each stored event to the broadcaster, which forwards it to
//! live [`EventSubscription`]s and to any injected [`EventPublisher`]s
//! (message buses, projection feeders). Delivery is at-least-once at best:
//! a crash between commit and publish loses the notification, never the
//! event, so consumers must be idempotent and able to catch up from the log.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::config::DEFAULT_SUBSCRIPTION_CAPACITY;
use crate::event::StoredEvent;

/// Outbound messaging capability.
///
/// `publish` has no return value: a publisher is expected to log its own
/// failures. The store only guarantees that publishing was attempted.
pub trait EventPublisher: Send + Sync {
    /// Hands one committed event to the transport.
    fn publish(&self, event: &StoredEvent);
}

/// Broadcast channel scoped to one event store instance.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<StoredEvent>,
    publishers: Vec<Arc<dyn EventPublisher>>,
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscribers", &self.sender.receiver_count())
            .field("publishers", &self.publishers.len())
            .finish()
    }
}

impl EventBroadcaster {
    /// Creates a broadcaster that buffers up to `capacity` events per
    /// subscriber before the slowest one starts lagging.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            publishers: Vec::new(),
        }
    }

    /// Adds an outbound publisher that receives every committed event.
    #[must_use]
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publishers.push(publisher);
        self
    }

    /// Opens a live subscription, optionally narrowed to one stream type.
    #[must_use]
    pub fn subscribe(&self, stream_type: Option<&str>) -> EventSubscription {
        EventSubscription {
            inner: BroadcastStream::new(self.sender.subscribe()),
            stream_type: stream_type.map(str::to_owned),
        }
    }

    /// Returns the number of open subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIPTION_CAPACITY)
    }
}

impl EventPublisher for EventBroadcaster {
    fn publish(&self, event: &StoredEvent) {
        // Having no live subscriber is not an error.
        let _ = self.sender.send(event.clone());
        for publisher in &self.publishers {
            publisher.publish(event);
        }
    }
}

/// A live, unbounded sequence of events appended after it was opened.
///
/// Subscriptions do not replay history and cannot be restarted; a consumer
/// that falls behind by more than the channel capacity skips the overflowed
/// events (logged at `warn`) and must catch up from the log itself.
#[derive(Debug)]
pub struct EventSubscription {
    inner: BroadcastStream<StoredEvent>,
    stream_type: Option<String>,
}

impl EventSubscription {
    /// Waits for the next matching event. Returns `None` once the owning
    /// store has been dropped.
    pub async fn recv(&mut self) -> Option<StoredEvent> {
        futures::StreamExt::next(self).await
    }

    fn matches(&self, event: &StoredEvent) -> bool {
        self.stream_type
            .as_deref()
            .is_none_or(|stream_type| stream_type == event.stream_type)
    }
}

impl Stream for EventSubscription {
    type Item = StoredEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => {
                    if self.matches(&event) {
                        return Poll::Ready(Some(event));
                    }
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    tracing::warn!(
                        skipped,
                        stream_type = self.stream_type.as_deref().unwrap_or("*"),
                        "event subscription lagged; events were skipped"
                    );
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::stream::StreamId;

    fn event(stream_type: &str, sequence_number: i64) -> StoredEvent {
        StoredEvent {
            sequence_number,
            event_id: Uuid::new_v4(),
            stream_id: StreamId::from(format!("{stream_type}-1")),
            stream_type: stream_type.to_owned(),
            version: sequence_number,
            event_type: "test.happened".to_owned(),
            payload: serde_json::json!({}),
            correlation_id: Uuid::new_v4(),
            causation_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
        }
    }

    #[derive(Default)]
    struct Collecting(Mutex<Vec<i64>>);

    impl EventPublisher for Collecting {
        fn publish(&self, event: &StoredEvent) {
            self.0.lock().unwrap().push(event.sequence_number);
        }
    }

    #[tokio::test]
    async fn test_subscription_receives_only_events_published_after_subscribe() {
        let broadcaster = EventBroadcaster::new(16);
        broadcaster.publish(&event("Order", 1));

        let mut subscription = broadcaster.subscribe(None);
        broadcaster.publish(&event("Order", 2));

        let received = subscription.recv().await.unwrap();
        assert_eq!(received.sequence_number, 2);
    }

    #[tokio::test]
    async fn test_filtered_subscription_skips_other_stream_types() {
        let broadcaster = EventBroadcaster::new(16);
        let mut orders = broadcaster.subscribe(Some("Order"));

        broadcaster.publish(&event("Payment", 1));
        broadcaster.publish(&event("Order", 2));

        let received = orders.recv().await.unwrap();
        assert_eq!(received.stream_type, "Order");
        assert_eq!(received.sequence_number, 2);
    }

    #[tokio::test]
    async fn test_lagging_subscription_skips_overflow_and_continues() {
        let broadcaster = EventBroadcaster::new(2);
        let mut subscription = broadcaster.subscribe(None);

        for sequence_number in 1..=5 {
            broadcaster.publish(&event("Order", sequence_number));
        }

        let received = subscription.recv().await.unwrap();
        assert_eq!(received.sequence_number, 4);
    }

    #[tokio::test]
    async fn test_subscription_ends_when_broadcaster_dropped() {
        let broadcaster = EventBroadcaster::new(4);
        let mut subscription = broadcaster.subscribe(None);

        drop(broadcaster);

        assert!(subscription.recv().await.is_none());
    }

    #[test]
    fn test_injected_publishers_receive_every_event() {
        let collecting = Arc::new(Collecting::default());
        let broadcaster = EventBroadcaster::new(4).with_publisher(collecting.clone());

        broadcaster.publish(&event("Order", 1));
        broadcaster.publish(&event("Payment", 2));

        assert_eq!(*collecting.0.lock().unwrap(), vec![1, 2]);
    }
}
