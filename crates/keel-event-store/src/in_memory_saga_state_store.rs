//! In-memory implementation of the `SagaStateStore` trait.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use keel_core::error::DomainError;
use keel_core::saga::{SagaState, SagaStateStore, SagaStatus};
use uuid::Uuid;

use crate::poisoned;

/// Saga state store backed by a `HashMap` keyed by saga id.
#[derive(Debug, Default)]
pub struct InMemorySagaStateStore {
    states: Mutex<HashMap<Uuid, SagaState>>,
}

impl InMemorySagaStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SagaStateStore for InMemorySagaStateStore {
    async fn save(&self, state: &SagaState) -> Result<(), DomainError> {
        let mut states = self.states.lock().map_err(|_| poisoned("saga state store"))?;
        states.insert(state.id, state.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<SagaState>, DomainError> {
        let states = self.states.lock().map_err(|_| poisoned("saga state store"))?;
        Ok(states.get(&id).cloned())
    }

    async fn find_by_status(
        &self,
        saga_type: &str,
        status: SagaStatus,
    ) -> Result<Vec<SagaState>, DomainError> {
        let states = self.states.lock().map_err(|_| poisoned("saga state store"))?;
        let mut found: Vec<SagaState> = states
            .values()
            .filter(|state| state.saga_type == saga_type && state.status == status)
            .cloned()
            .collect();
        found.sort_by_key(|state| (state.created_at, state.id));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    #[tokio::test]
    async fn test_find_by_status_filters_type_and_orders_oldest_first() {
        let store = InMemorySagaStateStore::new();
        let base = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let mut newer = SagaState::pending(Uuid::new_v4(), "checkout", serde_json::json!({}), base + Duration::minutes(5));
        newer.status = SagaStatus::Running;
        let mut older = SagaState::pending(Uuid::new_v4(), "checkout", serde_json::json!({}), base);
        older.status = SagaStatus::Running;
        let mut other_type = SagaState::pending(Uuid::new_v4(), "refund", serde_json::json!({}), base);
        other_type.status = SagaStatus::Running;
        let completed = SagaState {
            status: SagaStatus::Completed,
            ..SagaState::pending(Uuid::new_v4(), "checkout", serde_json::json!({}), base)
        };
        for state in [&newer, &older, &other_type, &completed] {
            store.save(state).await.unwrap();
        }

        let running = store
            .find_by_status("checkout", SagaStatus::Running)
            .await
            .unwrap();

        let ids: Vec<Uuid> = running.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![older.id, newer.id]);
    }

    #[tokio::test]
    async fn test_save_replaces_existing_state() {
        let store = InMemorySagaStateStore::new();
        let mut state = SagaState::pending(Uuid::new_v4(), "checkout", serde_json::json!({}), Utc::now());
        store.save(&state).await.unwrap();

        state.status = SagaStatus::Completed;
        state.completed_steps = vec!["place_order".to_owned()];
        store.save(&state).await.unwrap();

        let loaded = store.load(state.id).await.unwrap().unwrap();
        assert_eq!(loaded, state);
    }
}
