//! Keel sagas — multi-step workflows with compensating actions.
//!
//! A saga runs an ordered list of [`SagaStep`]s. When a step fails, the
//! steps that already completed are compensated in reverse order.
//! [`SagaOrchestrator`] does this in memory; [`PersistentSagaOrchestrator`]
//! additionally records progress in a `SagaStateStore` so sagas interrupted
//! by a crash can be compensated on restart.

pub mod orchestrator;
pub mod persistent;
pub mod step;
pub mod timeout;

pub use orchestrator::{SagaOrchestrator, SagaResult};
pub use persistent::{PersistentSagaOrchestrator, RecoveredSaga};
pub use step::SagaStep;
pub use timeout::TimeoutStep;
