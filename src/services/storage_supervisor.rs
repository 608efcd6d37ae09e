use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{event_store::EventStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect the event store in the background and keep the shared state in
/// degraded mode whenever it is unreachable.
///
/// A store that stops answering health checks gets a few in-place reconnect
/// attempts; once those are spent it is dropped and `connect` runs again.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn EventStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        let store = match connect().await {
            Ok(store) => store,
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = next_delay(delay);
                continue;
            }
        };

        state.set_event_store(store.clone()).await;
        info!("storage connection established; leaving degraded mode");
        delay = INITIAL_DELAY;

        watch_health(&state, store.as_ref()).await;

        warn!("exhausted storage reconnect attempts; dropping the store");
        state.clear_event_store().await;
        sleep(delay).await;
        delay = next_delay(delay);
    }
}

/// Returns once the store is considered lost.
async fn watch_health(state: &SharedState, store: &dyn EventStore) {
    loop {
        sleep(HEALTH_POLL_INTERVAL).await;

        if store.health_check().await.is_ok() {
            if state.is_degraded().await {
                info!("storage healthy again; leaving degraded mode");
                state.update_degraded(false).await;
            }
            continue;
        }

        if !reconnect(state, store).await {
            return;
        }
        state.update_degraded(false).await;
    }
}

async fn reconnect(state: &SharedState, store: &dyn EventStore) -> bool {
    let mut delay = INITIAL_DELAY;

    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(
                        attempt, error = %err,
                        "storage reconnect first attempt failed; entering degraded mode"
                    );
                    state.update_degraded(true).await;
                } else {
                    warn!(attempt, error = %err, "storage reconnect attempt failed");
                }
                sleep(delay).await;
                delay = next_delay(delay);
            }
        }
    }
    false
}

fn next_delay(delay: Duration) -> Duration {
    (delay * 2).min(MAX_DELAY)
}

#[cfg(test)]
mod tests {
    use tokio::time::advance;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{event_store::memory::MemoryEventStore, local_cache::MemoryCache},
        state::AppState,
    };

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn outage_toggles_degraded_mode() {
        let state = AppState::new(AppConfig::default(), Arc::new(MemoryCache::new()));
        let store = MemoryEventStore::default();
        let handle = store.clone();
        tokio::spawn(run(state.clone(), move || {
            let store = handle.clone();
            async move { Ok(Arc::new(store) as Arc<dyn EventStore>) }
        }));

        settle().await;
        assert!(!state.is_degraded().await);

        store.set_online(false);
        advance(HEALTH_POLL_INTERVAL).await;
        settle().await;
        assert!(state.is_degraded().await);
        assert!(state.event_store().await.is_some());

        store.set_online(true);
        advance(INITIAL_DELAY).await;
        settle().await;
        assert!(!state.is_degraded().await);
    }

    #[test]
    fn delay_doubles_up_to_cap() {
        assert_eq!(next_delay(INITIAL_DELAY), Duration::from_secs(2));
        assert_eq!(next_delay(Duration::from_secs(8)), MAX_DELAY);
    }
}
