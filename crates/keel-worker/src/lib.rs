//! Keel worker library: configuration, wiring and background tasks used by
//! the `keel-worker` binary.

pub mod audit;
pub mod config;
pub mod error;
pub mod state;
