//! Test publisher — captures everything an event store publishes.

use std::sync::Mutex;

use keel_core::event::StoredEvent;
use keel_core::subscription::EventPublisher;

/// An `EventPublisher` that records every published event in order.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<StoredEvent>>,
}

impl RecordingPublisher {
    /// Creates an empty recording publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all events published so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn published(&self) -> Vec<StoredEvent> {
        self.published.lock().unwrap().clone()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: &StoredEvent) {
        self.published.lock().unwrap().push(event.clone());
    }
}
