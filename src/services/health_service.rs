use tracing::warn;

use crate::{
    dto::health::{HealthResponse, HealthStatus},
    state::SharedState,
};

/// Probe the remote store and report the degraded flag with the write backlog.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let remote_reachable = match state.event_store().await {
        Some(store) => match store.health_check().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "event store health probe failed");
                false
            }
        },
        None => false,
    };

    let status = if state.is_degraded().await {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    };

    HealthResponse {
        status,
        remote_reachable,
        pending_writes: state.writes().in_flight(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{event_store::memory::MemoryEventStore, local_cache::MemoryCache},
        state::AppState,
    };

    #[tokio::test]
    async fn reports_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default(), Arc::new(MemoryCache::new()));
        let health = health_status(&state).await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(!health.remote_reachable);

        let store = MemoryEventStore::default();
        state.set_event_store(Arc::new(store.clone())).await;
        let health = health_status(&state).await;
        assert_eq!(health.status, HealthStatus::Ok);
        assert!(health.remote_reachable);

        store.set_online(false);
        assert!(!health_status(&state).await.remote_reachable);
    }
}
