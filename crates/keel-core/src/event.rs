//! Domain event abstractions.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::stream::StreamId;

/// Trait implemented by each aggregate's closed set of events.
///
/// Implementors are usually an `enum` with one variant per event; the whole
/// value is serialized as the stored payload and matched exhaustively when
/// applied.
pub trait DomainEvent:
    Serialize + DeserializeOwned + Clone + Send + Sync + std::fmt::Debug
{
    /// Returns the event type name (used for routing and filtering).
    fn event_type(&self) -> &'static str;

    /// Serializes the event payload to JSON.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the event cannot be encoded.
    fn to_payload(&self) -> Result<serde_json::Value, DomainError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decodes an event from a stored payload.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the payload does not match.
    fn from_payload(payload: &serde_json::Value) -> Result<Self, DomainError> {
        Ok(Self::deserialize(payload)?)
    }
}

/// Metadata attached to every event an aggregate records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Correlation ID for tracing a command through its effects.
    pub correlation_id: Uuid,
    /// Causation ID linking this event to the event/command that caused it.
    pub causation_id: Uuid,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

/// A typed event recorded by an aggregate but not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent<E> {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub event: E,
}

impl<E: DomainEvent> RecordedEvent<E> {
    /// Serializes this event into its storable form.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the payload cannot be encoded.
    pub fn to_new_event(&self) -> Result<NewEvent, DomainError> {
        Ok(NewEvent {
            event_id: self.metadata.event_id,
            event_type: self.event.event_type().to_owned(),
            payload: self.event.to_payload()?,
            correlation_id: self.metadata.correlation_id,
            causation_id: self.metadata.causation_id,
            occurred_at: self.metadata.occurred_at,
        })
    }
}

/// An event that has not yet been assigned a stream position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Type name for deserialization routing.
    pub event_type: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Correlation ID for tracing a command through its effects.
    pub correlation_id: Uuid,
    /// Causation ID linking this event to the command that caused it.
    pub causation_id: Uuid,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

/// Immutable record of one domain occurrence, as persisted in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Global, store-wide position. Advisory ordering across streams.
    pub sequence_number: i64,
    /// Unique event identifier.
    pub event_id: Uuid,
    /// The stream this event belongs to.
    pub stream_id: StreamId,
    /// Logical aggregate type of the owning stream.
    pub stream_type: String,
    /// Position within the stream, gapless from 0.
    pub version: i64,
    /// Event type name for deserialization routing.
    pub event_type: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Causation ID linking to the causing event/command.
    pub causation_id: Uuid,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

impl StoredEvent {
    /// Builds the stored form of `event` at the given stream position.
    #[must_use]
    pub fn from_new(
        event: NewEvent,
        stream_id: StreamId,
        stream_type: &str,
        version: i64,
        sequence_number: i64,
    ) -> Self {
        Self {
            sequence_number,
            event_id: event.event_id,
            stream_id,
            stream_type: stream_type.to_owned(),
            version,
            event_type: event.event_type,
            payload: event.payload,
            correlation_id: event.correlation_id,
            causation_id: event.causation_id,
            occurred_at: event.occurred_at,
        }
    }

    /// Decodes the payload into the aggregate's event type.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the payload does not match `E`.
    pub fn decode<E: DomainEvent>(&self) -> Result<E, DomainError> {
        E::from_payload(&self.payload).map_err(|e| {
            DomainError::Serialization(format!(
                "event {} ({}) at {}@{}: {e}",
                self.event_id, self.event_type, self.stream_id, self.version
            ))
        })
    }
}
