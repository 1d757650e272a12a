//! Shared worker state: stores, repositories and the checkout saga.

use std::sync::Arc;

use keel_core::clock::{SharedClock, SystemClock};
use keel_core::config::RepositoryConfig;
use keel_core::repository::AggregateRepository;
use keel_core::saga::SagaStateStore;
use keel_core::snapshot::SnapshotStore;
use keel_core::store::EventStore;
use keel_core::subscription::EventBroadcaster;
use keel_event_store::{PgEventStore, PgSagaStateStore, PgSnapshotStore};
use keel_ordering::application::checkout::{CheckoutData, checkout_saga};
use keel_ordering::domain::aggregates::{Order, Payment};
use keel_saga::PersistentSagaOrchestrator;
use sqlx::PgPool;

use crate::audit::TracingPublisher;
use crate::config::WorkerConfig;

/// Everything a worker process shares between its tasks.
pub struct WorkerState {
    /// The event log.
    pub events: Arc<dyn EventStore>,
    /// Order repository.
    pub orders: AggregateRepository<Order>,
    /// Payment repository.
    pub payments: AggregateRepository<Payment>,
    /// Checkout saga with persisted progress.
    pub checkout: PersistentSagaOrchestrator<CheckoutData>,
}

impl WorkerState {
    /// Wires the `PostgreSQL` stores on `pool`.
    #[must_use]
    pub fn postgres(pool: &PgPool, config: &WorkerConfig) -> Self {
        let broadcaster = EventBroadcaster::new(config.subscription_capacity)
            .with_publisher(Arc::new(TracingPublisher));
        Self::with_stores(
            Arc::new(PgEventStore::with_broadcaster(pool.clone(), broadcaster)),
            Arc::new(PgSnapshotStore::new(pool.clone())),
            Arc::new(PgSagaStateStore::new(pool.clone())),
            config,
            SystemClock::shared(),
        )
    }

    /// Wires arbitrary store implementations.
    #[must_use]
    pub fn with_stores(
        events: Arc<dyn EventStore>,
        snapshots: Arc<dyn SnapshotStore>,
        sagas: Arc<dyn SagaStateStore>,
        config: &WorkerConfig,
        clock: SharedClock,
    ) -> Self {
        let repository_config = RepositoryConfig {
            snapshot_interval: config.snapshot_interval,
            ..RepositoryConfig::default()
        };
        let orders = AggregateRepository::new(events.clone())
            .with_snapshots(snapshots.clone(), repository_config)
            .with_clock(clock.clone());
        let payments = AggregateRepository::new(events.clone())
            .with_snapshots(snapshots, repository_config)
            .with_clock(clock.clone());
        let saga = checkout_saga(&orders, &payments, &clock, config.saga_step_timeout);
        let checkout = PersistentSagaOrchestrator::new(saga, sagas).with_clock(clock);
        Self {
            events,
            orders,
            payments,
            checkout,
        }
    }
}
