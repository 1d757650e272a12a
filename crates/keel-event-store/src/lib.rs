//! Keel storage backends.
//!
//! Two implementations of each storage trait from `keel-core`:
//!
//! - in-memory stores for tests and single-process use, and
//! - `PostgreSQL` stores built on `sqlx`, using the schema in `migrations/`.

pub mod in_memory_event_store;
pub mod in_memory_saga_state_store;
pub mod in_memory_snapshot_store;
pub mod pg_event_store;
pub mod pg_saga_state_store;
pub mod pg_snapshot_store;

pub use in_memory_event_store::InMemoryEventStore;
pub use in_memory_saga_state_store::InMemorySagaStateStore;
pub use in_memory_snapshot_store::InMemorySnapshotStore;
pub use pg_event_store::PgEventStore;
pub use pg_saga_state_store::PgSagaStateStore;
pub use pg_snapshot_store::PgSnapshotStore;

use keel_core::error::DomainError;

/// Maps a driver error to an infrastructure error.
pub(crate) fn db_error(context: &str, err: &sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("{context}: {err}"))
}

/// Maps a poisoned in-memory lock to an infrastructure error.
pub(crate) fn poisoned(what: &str) -> DomainError {
    DomainError::Infrastructure(format!("{what} lock poisoned"))
}
