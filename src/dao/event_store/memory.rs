//! Process-local [`EventStore`] used for tests, demos and cache-only deployments.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use tokio::time::sleep;

use crate::dao::{
    event_store::EventStore,
    models::{EventEntity, ParticipantEntity, Revision, VersionedEvent},
    storage::{StorageError, StorageResult},
};

/// Behaviour switches of the in-memory backend.
#[derive(Debug, Clone)]
pub struct MemoryStoreOptions {
    /// Expose a revision marker and enforce it on conditional writes. When
    /// `false` the store behaves like a backend without versioning: reads carry
    /// no revision and every replace is unconditional.
    pub versioned: bool,
    /// Whether change polling is supported; sessions fall back to manual
    /// polling otherwise.
    pub watchable: bool,
    /// Simulated round trip applied to reads. The document is captured before
    /// the delay, like a response already on the wire.
    pub latency: Duration,
}

impl Default for MemoryStoreOptions {
    fn default() -> Self {
        Self {
            versioned: true,
            watchable: true,
            latency: Duration::ZERO,
        }
    }
}

#[derive(Debug, Error)]
enum MemoryStoreError {
    #[error("in-memory store is offline")]
    Offline,
}

struct StoredDocument {
    revision: u64,
    body: Value,
}

struct MemoryInner {
    documents: DashMap<String, StoredDocument>,
    detached: DashMap<String, Vec<ParticipantEntity>>,
    options: MemoryStoreOptions,
    online: AtomicBool,
    writes: AtomicU64,
}

/// In-memory document store keeping events as raw JSON bodies.
#[derive(Clone)]
pub struct MemoryEventStore {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryEventStore {
    fn default() -> Self {
        Self::new(MemoryStoreOptions::default())
    }
}

impl MemoryEventStore {
    pub fn new(options: MemoryStoreOptions) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                documents: DashMap::new(),
                detached: DashMap::new(),
                options,
                online: AtomicBool::new(true),
                writes: AtomicU64::new(0),
            }),
        }
    }

    /// Store a raw document body as is, e.g. a legacy encoding.
    pub fn insert_raw(&self, id: impl Into<String>, body: Value) {
        let id = id.into();
        let revision = self
            .inner
            .documents
            .get(&id)
            .map(|doc| doc.revision + 1)
            .unwrap_or(1);
        self.inner
            .documents
            .insert(id, StoredDocument { revision, body });
    }

    /// Register participant records kept outside the event document.
    pub fn set_detached_participants(&self, event_id: impl Into<String>, participants: Vec<ParticipantEntity>) {
        self.inner.detached.insert(event_id.into(), participants);
    }

    /// Simulate the backend going away or coming back.
    pub fn set_online(&self, online: bool) {
        self.inner.online.store(online, Ordering::SeqCst);
    }

    /// Decoded current document, bypassing latency and availability.
    pub fn document(&self, id: &str) -> Option<EventEntity> {
        let doc = self.inner.documents.get(id)?;
        serde_json::from_value::<EventEntity>(doc.body.clone())
            .ok()
            .map(EventEntity::normalize)
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> StorageResult<()> {
        if self.inner.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::unavailable(
                "in-memory store offline".into(),
                MemoryStoreError::Offline,
            ))
        }
    }

    fn encode(event: &EventEntity) -> StorageResult<Value> {
        serde_json::to_value(event).map_err(|err| StorageError::decode(event.id.clone(), err))
    }

    fn write(&self, event: &EventEntity) -> StorageResult<()> {
        let body = Self::encode(event)?;
        self.insert_raw(event.id.clone(), body);
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn revision_of(&self, revision: u64) -> Option<Revision> {
        self.inner
            .options
            .versioned
            .then(|| Revision(revision.to_string()))
    }
}

impl EventStore for MemoryEventStore {
    fn load_event(&self, id: String) -> BoxFuture<'static, StorageResult<Option<VersionedEvent>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            let captured = store
                .inner
                .documents
                .get(&id)
                .map(|doc| (doc.revision, doc.body.clone()));

            let latency = store.inner.options.latency;
            if !latency.is_zero() {
                sleep(latency).await;
            }

            let Some((revision, body)) = captured else {
                return Ok(None);
            };
            let mut event = serde_json::from_value::<EventEntity>(body)
                .map_err(|err| StorageError::decode(id.clone(), err))?;
            if event.id.is_empty() {
                event.id = id;
            }

            Ok(Some(VersionedEvent {
                event: event.normalize(),
                revision: store.revision_of(revision),
            }))
        })
    }

    fn save_event(&self, event: EventEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            store.write(&event)
        })
    }

    fn replace_event(
        &self,
        event: EventEntity,
        expected: Option<Revision>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            let expected = expected.filter(|_| store.inner.options.versioned);
            let Some(expected) = expected else {
                return store.write(&event);
            };

            let body = Self::encode(&event)?;
            let Some(mut slot) = store.inner.documents.get_mut(&event.id) else {
                return Err(StorageError::not_found(event.id));
            };
            if slot.revision.to_string() != expected.0 {
                return Err(StorageError::conflict(event.id));
            }
            slot.revision += 1;
            slot.body = body;
            drop(slot);

            store.inner.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn load_detached_participants(
        &self,
        event_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_online()?;
            Ok(store
                .inner
                .detached
                .get(&event_id)
                .map(|entry| entry.value().clone())
                .unwrap_or_default())
        })
    }

    fn watchable(&self) -> bool {
        self.inner.options.watchable
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_online() })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_online() })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use serde_json::json;

    use super::*;

    fn event(id: &str) -> EventEntity {
        EventEntity::new(id.into(), "Team Offsite".into(), "482913".into(), BTreeSet::new())
    }

    #[tokio::test]
    async fn conditional_replace_detects_stale_revision() {
        let store = MemoryEventStore::default();
        store.save_event(event("e1")).await.unwrap();

        let first = store.load_event("e1".into()).await.unwrap().unwrap();
        let stale = first.revision.clone();
        store
            .replace_event(first.event.clone(), first.revision)
            .await
            .unwrap();

        let err = store.replace_event(first.event, stale).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn unversioned_store_overwrites_blindly() {
        let store = MemoryEventStore::new(MemoryStoreOptions {
            versioned: false,
            ..MemoryStoreOptions::default()
        });
        store.save_event(event("e1")).await.unwrap();

        let loaded = store.load_event("e1".into()).await.unwrap().unwrap();
        assert!(loaded.revision.is_none());
        store
            .replace_event(loaded.event.clone(), Some(Revision("99".into())))
            .await
            .unwrap();
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn legacy_body_decodes_with_key_as_id() {
        let store = MemoryEventStore::default();
        store.insert_raw(
            "old",
            json!({ "title": "Old", "pin": 111111, "participants": [{ "name": "Bold Owl", "answers": [1] }] }),
        );

        let loaded = store.load_event("old".into()).await.unwrap().unwrap();
        assert_eq!(loaded.event.id, "old");
        assert_eq!(loaded.event.participants[0].id, "legacy:Bold Owl");
    }

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let store = MemoryEventStore::default();
        store.set_online(false);
        let err = store.load_event("e1".into()).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { .. }));
        assert!(store.health_check().await.is_err());
    }
}
