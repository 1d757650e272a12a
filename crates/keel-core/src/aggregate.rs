//! Aggregate root abstraction.
//!
//! An [`Aggregate`] is the pure state of one consistency boundary: it knows
//! how to fold its own events and nothing else. [`AggregateRoot`] wraps that
//! state with the bookkeeping event sourcing needs (identity, the version
//! last loaded from the store, and events recorded since).

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::clock::Clock;
use crate::command::Command;
use crate::error::DomainError;
use crate::event::{DomainEvent, EventMetadata, NewEvent, RecordedEvent, StoredEvent};
use crate::snapshot::Snapshot;
use crate::stream::{NO_VERSION, StreamId};

/// State of an event-sourced aggregate.
///
/// `apply` must be deterministic and free of side effects: replaying the
/// same events onto `Default::default()` always yields the same state.
pub trait Aggregate: Default + Serialize + DeserializeOwned + Send + Sync {
    /// Logical type name of this aggregate's streams.
    const STREAM_TYPE: &'static str;

    /// The closed set of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Folds one event into the state.
    fn apply(&mut self, event: &Self::Event);
}

/// An aggregate instance together with its event-sourcing bookkeeping.
#[derive(Debug, Clone)]
pub struct AggregateRoot<A: Aggregate> {
    id: StreamId,
    version: i64,
    state: A,
    uncommitted_events: Vec<RecordedEvent<A::Event>>,
}

impl<A: Aggregate> AggregateRoot<A> {
    /// Creates a brand-new aggregate with no history.
    #[must_use]
    pub fn new(id: impl Into<StreamId>) -> Self {
        Self {
            id: id.into(),
            version: NO_VERSION,
            state: A::default(),
            uncommitted_events: Vec::new(),
        }
    }

    /// Reconstitutes an aggregate by replaying its full history.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if an event payload cannot be
    /// decoded, or `DomainError::Infrastructure` if the history has gaps.
    pub fn from_history(
        id: impl Into<StreamId>,
        events: &[StoredEvent],
    ) -> Result<Self, DomainError> {
        let mut root = Self::new(id);
        for stored in events {
            root.replay(stored)?;
        }
        Ok(root)
    }

    /// Restores an aggregate from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the snapshot state does not
    /// decode into `A`.
    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Self, DomainError> {
        let state: A = serde_json::from_value(snapshot.state.clone())?;
        Ok(Self {
            id: snapshot.stream_id.clone(),
            version: snapshot.version,
            state,
            uncommitted_events: Vec::new(),
        })
    }

    /// Returns the aggregate identifier.
    #[must_use]
    pub fn id(&self) -> &StreamId {
        &self.id
    }

    /// Returns the version of the last persisted event, or `-1` if none.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Returns the current state, including uncommitted events.
    #[must_use]
    pub fn state(&self) -> &A {
        &self.state
    }

    /// Returns events recorded since the aggregate was loaded or saved.
    #[must_use]
    pub fn uncommitted_events(&self) -> &[RecordedEvent<A::Event>] {
        &self.uncommitted_events
    }

    /// Returns `true` if there are events waiting to be saved.
    #[must_use]
    pub fn has_uncommitted_events(&self) -> bool {
        !self.uncommitted_events.is_empty()
    }

    /// Runs a command against the current state.
    ///
    /// `decide` validates the transition and returns the events it produces;
    /// each event is applied to the state and recorded for persistence. If
    /// `decide` fails nothing is recorded. The version does not move until
    /// the events are saved.
    ///
    /// # Errors
    ///
    /// Returns whatever error `decide` returns.
    pub fn execute<C, F>(
        &mut self,
        command: &C,
        clock: &dyn Clock,
        decide: F,
    ) -> Result<(), DomainError>
    where
        C: Command,
        F: FnOnce(&A) -> Result<Vec<A::Event>, DomainError>,
    {
        let events = decide(&self.state)?;
        let occurred_at = clock.now();
        for event in events {
            self.record(event, command, occurred_at);
        }
        Ok(())
    }

    fn record<C: Command>(&mut self, event: A::Event, command: &C, occurred_at: DateTime<Utc>) {
        let metadata = EventMetadata {
            event_id: Uuid::new_v4(),
            correlation_id: command.correlation_id(),
            causation_id: command.causation_id(),
            occurred_at,
        };
        self.state.apply(&event);
        self.uncommitted_events.push(RecordedEvent { metadata, event });
    }

    /// Folds one persisted event into the state.
    pub(crate) fn replay(&mut self, stored: &StoredEvent) -> Result<(), DomainError> {
        if stored.version != self.version + 1 {
            return Err(DomainError::Infrastructure(format!(
                "stream {} is out of order: expected version {}, got {}",
                self.id,
                self.version + 1,
                stored.version
            )));
        }
        let event: A::Event = stored.decode()?;
        self.state.apply(&event);
        self.version = stored.version;
        Ok(())
    }

    /// Serializes the uncommitted events for appending.
    pub(crate) fn new_events(&self) -> Result<Vec<NewEvent>, DomainError> {
        self.uncommitted_events
            .iter()
            .map(RecordedEvent::to_new_event)
            .collect()
    }

    /// Advances to the stored version and forgets the saved events.
    pub(crate) fn mark_committed(&mut self, version: i64) {
        self.version = version;
        self.uncommitted_events.clear();
    }

    /// Captures the committed state.
    pub(crate) fn to_snapshot(&self, taken_at: DateTime<Utc>) -> Result<Snapshot, DomainError> {
        Ok(Snapshot {
            stream_id: self.id.clone(),
            stream_type: A::STREAM_TYPE.to_owned(),
            version: self.version,
            state: serde_json::to_value(&self.state)?,
            taken_at,
        })
    }
}
