//! Durable key-value cache standing in for browser local storage.
//!
//! Event snapshots live under the host-wide key `event_<id>`; everything a
//! single device owns is namespaced through [`DeviceCache`].

mod device;
mod error;
mod file;
mod memory;

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, PoisonError},
};

use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::dao::models::{EventEntity, ParticipantEntity};

pub use self::device::DeviceCache;
pub use self::error::{CacheError, CacheResult};
pub use self::file::FileCache;
pub use self::memory::MemoryCache;

/// Raw string storage backing the cache.
pub trait LocalCache: Send + Sync {
    fn get(&self, key: &str) -> CacheResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> CacheResult<()>;
    fn remove(&self, key: &str) -> CacheResult<()>;
}

/// Typed access to the cache shared by every session of the host.
pub struct CacheStore {
    backend: Arc<dyn LocalCache>,
    write_lock: Mutex<()>,
    archive_limit: usize,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn LocalCache>, archive_limit: usize) -> Arc<Self> {
        Arc::new(Self {
            backend,
            write_lock: Mutex::new(()),
            archive_limit,
        })
    }

    /// Cache scoped to one device.
    pub fn device(self: &Arc<Self>, device_id: &str) -> DeviceCache {
        DeviceCache::new(self.clone(), device_id)
    }

    /// Cached snapshot of an event, if any.
    pub fn event(&self, event_id: &str) -> CacheResult<Option<EventEntity>> {
        let event: Option<EventEntity> = self.read_json(&event_key(event_id))?;
        Ok(event.map(|mut event| {
            if event.id.is_empty() {
                event.id = event_id.to_owned();
            }
            event.normalize()
        }))
    }

    /// Overwrite the cached snapshot of an event.
    pub fn put_event(&self, event: &EventEntity) -> CacheResult<()> {
        self.write_json(&event_key(&event.id), event)
    }

    /// Splice one participant into the cached snapshot.
    ///
    /// When nothing is cached yet `base` seeds the entry. Returns the snapshot
    /// as written, or `None` when there was nothing to merge into.
    pub fn merge_participant(
        &self,
        event_id: &str,
        participant: &ParticipantEntity,
        base: Option<&EventEntity>,
    ) -> CacheResult<Option<EventEntity>> {
        let _guard = self.lock();
        let cached = match self.event(event_id)? {
            Some(event) => Some(event),
            None => base.cloned(),
        };
        let Some(mut event) = cached else {
            debug!(event_id, "no snapshot to merge participant into");
            return Ok(None);
        };

        event.upsert_participant(participant.clone());
        self.put_event(&event)?;
        Ok(Some(event))
    }

    /// Participant ids written locally but not yet confirmed by the remote.
    pub fn pending(&self, event_id: &str) -> CacheResult<BTreeSet<String>> {
        Ok(self
            .read_json(&pending_key(event_id))?
            .unwrap_or_default())
    }

    /// Remember that `participant_id` still has to reach the remote.
    pub fn mark_pending(&self, event_id: &str, participant_id: &str) -> CacheResult<()> {
        let _guard = self.lock();
        let mut pending = self.pending(event_id)?;
        if pending.insert(participant_id.to_owned()) {
            self.write_json(&pending_key(event_id), &pending)?;
        }
        Ok(())
    }

    /// Forget a participant once the remote holds its latest write.
    pub fn clear_pending(&self, event_id: &str, participant_id: &str) -> CacheResult<()> {
        let _guard = self.lock();
        let mut pending = self.pending(event_id)?;
        if !pending.remove(participant_id) {
            return Ok(());
        }
        if pending.is_empty() {
            self.backend.remove(&pending_key(event_id))
        } else {
            self.write_json(&pending_key(event_id), &pending)
        }
    }

    /// Fold the cached snapshot into a freshly loaded remote event.
    ///
    /// Participants that are pending, or that the remote does not know at
    /// all, keep their cached version and are returned as `unsynced`. The
    /// merged snapshot replaces the cached one.
    pub fn reconcile(&self, remote: &EventEntity) -> CacheResult<Reconciled> {
        let _guard = self.lock();
        let pending = self.pending(&remote.id)?;
        let mut merged = remote.clone();
        let mut unsynced = Vec::new();

        if let Some(cached) = self.event(&remote.id)? {
            for participant in cached.participants {
                let local_only = remote.participant(&participant.id).is_none();
                if local_only || pending.contains(&participant.id) {
                    merged.upsert_participant(participant.clone());
                    unsynced.push(participant);
                }
            }
        }

        self.put_event(&merged)?;
        Ok(Reconciled {
            event: merged,
            unsynced,
        })
    }

    pub(crate) fn archive_limit(&self) -> usize {
        self.archive_limit
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn raw(&self) -> &dyn LocalCache {
        self.backend.as_ref()
    }

    pub(crate) fn read_json<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let Some(raw) = self.backend.get(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| CacheError::Decode {
                key: key.to_owned(),
                source,
            })
    }

    pub(crate) fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> CacheResult<()> {
        let raw = serde_json::to_string(value).map_err(|source| CacheError::Encode {
            key: key.to_owned(),
            source,
        })?;
        self.backend.set(key, &raw)
    }
}

/// Outcome of [`CacheStore::reconcile`].
#[derive(Debug)]
pub struct Reconciled {
    /// Remote event with local-only and pending participants spliced in.
    pub event: EventEntity,
    /// Participants the remote still has to receive.
    pub unsynced: Vec<ParticipantEntity>,
}

fn event_key(event_id: &str) -> String {
    format!("event_{event_id}")
}

fn pending_key(event_id: &str) -> String {
    format!("pending_{event_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::answers::Answers;

    fn store() -> Arc<CacheStore> {
        CacheStore::new(Arc::new(MemoryCache::new()), 5)
    }

    fn participant(id: &str, score: i32) -> ParticipantEntity {
        ParticipantEntity {
            id: id.into(),
            name: "Swift Deer".into(),
            avatar: "🦄".into(),
            score,
            answers: Answers::default(),
        }
    }

    #[test]
    fn merge_seeds_from_base_then_splices() {
        let cache = store();
        let base = EventEntity::new("e1".into(), "T".into(), "123456".into(), BTreeSet::new());

        assert!(cache.merge_participant("e1", &participant("a", 1), None).unwrap().is_none());

        cache
            .merge_participant("e1", &participant("a", 1), Some(&base))
            .unwrap();
        cache
            .merge_participant("e1", &participant("a", 4), None)
            .unwrap();
        cache
            .merge_participant("e1", &participant("b", 0), None)
            .unwrap();

        let cached = cache.event("e1").unwrap().unwrap();
        assert_eq!(cached.participants.len(), 2);
        assert_eq!(cached.participant("a").unwrap().score, 4);
    }

    #[test]
    fn reconcile_keeps_local_writes_the_remote_lacks() {
        let cache = store();
        let base = EventEntity::new("e1".into(), "T".into(), "123456".into(), BTreeSet::new());
        cache.merge_participant("e1", &participant("a", 1), Some(&base)).unwrap();
        cache.merge_participant("e1", &participant("b", 3), None).unwrap();
        cache.merge_participant("e1", &participant("c", 7), None).unwrap();
        cache.mark_pending("e1", "c").unwrap();

        // The remote knows a and an older c, but never saw b.
        let mut remote = base.clone();
        remote.upsert_participant(participant("a", 2));
        remote.upsert_participant(participant("c", 0));

        let reconciled = cache.reconcile(&remote).unwrap();
        let unsynced: Vec<&str> = reconciled.unsynced.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(unsynced, ["b", "c"]);
        assert_eq!(reconciled.event.participant("a").unwrap().score, 2);
        assert_eq!(reconciled.event.participant("c").unwrap().score, 7);
        assert_eq!(cache.event("e1").unwrap().unwrap().participants.len(), 3);
    }

    #[test]
    fn pending_set_empties_out() {
        let cache = store();
        cache.mark_pending("e1", "a").unwrap();
        cache.mark_pending("e1", "b").unwrap();
        cache.clear_pending("e1", "a").unwrap();
        assert_eq!(cache.pending("e1").unwrap(), BTreeSet::from(["b".to_owned()]));

        cache.clear_pending("e1", "b").unwrap();
        assert!(cache.pending("e1").unwrap().is_empty());
        assert_eq!(cache.raw().get("pending_e1").unwrap(), None);
    }

    #[test]
    fn legacy_snapshot_without_id_takes_key() {
        let cache = store();
        cache
            .raw()
            .set("event_old", r#"{"title":"Old","pin":"100000","participants":[]}"#)
            .unwrap();
        let cached = cache.event("old").unwrap().unwrap();
        assert_eq!(cached.id, "old");
    }

    #[test]
    fn malformed_snapshot_is_a_decode_error() {
        let cache = store();
        cache.raw().set("event_bad", "not json").unwrap();
        assert!(matches!(cache.event("bad"), Err(CacheError::Decode { .. })));
    }
}
