//! Keel Core — shared event-sourcing abstractions.
//!
//! This crate defines the traits and types every storage backend and
//! bounded context depends on: streams and stored events, aggregates and
//! their repository, snapshots, live subscriptions, and saga state. It
//! contains no database code.

pub mod aggregate;
pub mod clock;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod repository;
pub mod retry;
pub mod saga;
pub mod snapshot;
pub mod store;
pub mod stream;
pub mod subscription;
