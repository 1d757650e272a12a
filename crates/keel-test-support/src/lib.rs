//! Shared test doubles and utilities for Keel.

mod clock;
mod publisher;
mod saga;
mod store;

pub use clock::FixedClock;
pub use publisher::RecordingPublisher;
pub use saga::{CallLog, ScriptedStep};
pub use store::{FailingEventStore, FailingSnapshotStore, HangingSnapshotStore};
