pub mod session;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::{
        event_store::EventStore,
        local_cache::{CacheStore, DeviceCache, LocalCache},
    },
    services::{
        questions::QuestionCatalog,
        remote_store::RemoteEvents,
        sync_engine::SessionContext,
        write_queue::WriteQueue,
    },
};

pub type SharedState = Arc<AppState>;

/// Central application state holding the storage handles shared by every session.
pub struct AppState {
    event_store: RwLock<Option<Arc<dyn EventStore>>>,
    degraded: watch::Sender<bool>,
    cache: Arc<CacheStore>,
    writes: WriteQueue,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, cache: Arc<dyn LocalCache>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let cache = CacheStore::new(cache, config.archive_limit);
        Arc::new(Self {
            event_store: RwLock::new(None),
            degraded: degraded_tx,
            writes: WriteQueue::new(cache.clone()),
            cache,
            config,
        })
    }

    /// Obtain a handle to the current event store, if one is installed.
    pub async fn event_store(&self) -> Option<Arc<dyn EventStore>> {
        let guard = self.event_store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a new event store implementation and leave degraded mode.
    pub async fn set_event_store(&self, store: Arc<dyn EventStore>) {
        {
            let mut guard = self.event_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current event store and enter degraded mode.
    pub async fn clear_event_store(&self) {
        {
            let mut guard = self.event_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Remote store for new sessions; `None` in degraded mode.
    pub async fn remote(&self) -> Option<RemoteEvents> {
        if self.is_degraded().await {
            return None;
        }
        self.event_store().await.map(|store| {
            RemoteEvents::new(
                store,
                self.config.retry,
                self.config.sync.remote_poll_interval,
            )
        })
    }

    /// Everything a sync session needs, reflecting the current storage mode.
    pub async fn session_context(&self) -> SessionContext {
        SessionContext {
            remote: self.remote().await,
            cache: self.cache.clone(),
            writes: self.writes.clone(),
            settings: self.config.sync,
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Cache namespace of one device.
    pub fn device_cache(&self, device_id: &str) -> DeviceCache {
        self.cache.device(device_id)
    }

    /// Queue of pending remote participant writes.
    pub fn writes(&self) -> &WriteQueue {
        &self.writes
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn questions(&self) -> &QuestionCatalog {
        &self.config.questions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{event_store::memory::MemoryEventStore, local_cache::MemoryCache};

    #[tokio::test]
    async fn degraded_until_store_installed() {
        let state = AppState::new(AppConfig::default(), Arc::new(MemoryCache::new()));
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded().await);
        assert!(state.remote().await.is_none());

        state
            .set_event_store(Arc::new(MemoryEventStore::default()))
            .await;
        assert!(!state.is_degraded().await);
        assert!(watcher.has_changed().unwrap());
        assert!(state.session_context().await.remote.is_some());

        state.update_degraded(true).await;
        assert!(state.remote().await.is_none());

        state.clear_event_store().await;
        assert!(state.event_store().await.is_none());
    }
}
