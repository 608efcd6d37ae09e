//! Per-participant serialization of remote writes.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{
    dao::{local_cache::CacheStore, models::ParticipantEntity},
    services::remote_store::RemoteEvents,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WriteKey {
    event_id: String,
    participant_id: String,
}

/// Fire-and-forget remote participant writes, at most one in flight per
/// (event, participant). Edits queued behind a running write collapse into
/// the latest value. A participant's pending mark in the cache is cleared
/// once the last queued write for it lands.
#[derive(Clone)]
pub struct WriteQueue {
    // Presence of a key means a worker owns it; the value is the next write.
    slots: Arc<DashMap<WriteKey, Option<ParticipantEntity>>>,
    active: Arc<watch::Sender<usize>>,
    cache: Arc<CacheStore>,
}

impl WriteQueue {
    pub fn new(cache: Arc<CacheStore>) -> Self {
        let (active, _rx) = watch::channel(0);
        Self {
            slots: Arc::new(DashMap::new()),
            active: Arc::new(active),
            cache,
        }
    }

    /// Schedule `participant` to be written to `remote`.
    pub fn enqueue(&self, remote: RemoteEvents, event_id: &str, participant: ParticipantEntity) {
        let key = WriteKey {
            event_id: event_id.to_owned(),
            participant_id: participant.id.clone(),
        };

        let spawn = match self.slots.entry(key.clone()) {
            Entry::Occupied(mut slot) => {
                if slot.get().is_some() {
                    debug!(event_id, participant_id = %key.participant_id, "coalescing queued write");
                }
                slot.insert(Some(participant));
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(Some(participant));
                true
            }
        };

        if spawn {
            self.active.send_modify(|count| *count += 1);
            let queue = self.clone();
            tokio::spawn(async move { queue.drain(remote, key).await });
        }
    }

    async fn drain(self, remote: RemoteEvents, key: WriteKey) {
        let mut delivered = false;
        while let Some(participant) = self.next_for(&key, delivered) {
            delivered = match remote.update_participant(&key.event_id, participant).await {
                Ok(()) => true,
                Err(err) => {
                    warn!(
                        event_id = %key.event_id,
                        participant_id = %key.participant_id,
                        error = %err,
                        "remote participant write failed; local copy kept"
                    );
                    false
                }
            };
        }
        self.active.send_modify(|count| *count = count.saturating_sub(1));
    }

    fn next_for(&self, key: &WriteKey, delivered: bool) -> Option<ParticipantEntity> {
        match self.slots.entry(key.clone()) {
            Entry::Occupied(mut slot) => match slot.get_mut().take() {
                Some(next) => Some(next),
                None => {
                    // Still holding the slot, so no newer write can be queued
                    // between this check and the clear.
                    if delivered {
                        if let Err(err) = self.cache.clear_pending(&key.event_id, &key.participant_id) {
                            warn!(event_id = %key.event_id, error = %err, "failed to clear pending mark");
                        }
                    }
                    slot.remove();
                    None
                }
            },
            Entry::Vacant(_) => None,
        }
    }

    /// Number of (event, participant) pairs with a worker running.
    pub fn in_flight(&self) -> usize {
        *self.active.borrow()
    }

    /// Wait until every queued write has been attempted.
    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, time::Duration};

    use super::*;
    use crate::{
        dao::{
            answers::Answers,
            event_store::{
                EventStore,
                memory::{MemoryEventStore, MemoryStoreOptions},
            },
            local_cache::MemoryCache,
            models::EventEntity,
        },
        services::retry::RetryPolicy,
    };

    fn cache() -> Arc<CacheStore> {
        CacheStore::new(Arc::new(MemoryCache::new()), 5)
    }

    fn participant(score: i32) -> ParticipantEntity {
        ParticipantEntity {
            id: "p1".into(),
            name: "Wise Lion".into(),
            avatar: "🦁".into(),
            score,
            answers: Answers::default(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn queued_edits_collapse_to_latest() {
        let store = MemoryEventStore::new(MemoryStoreOptions {
            latency: Duration::from_millis(100),
            ..MemoryStoreOptions::default()
        });
        store
            .save_event(EventEntity::new("e1".into(), "T".into(), "123456".into(), BTreeSet::new()))
            .await
            .unwrap();
        let remote = RemoteEvents::new(
            Arc::new(store.clone()),
            RetryPolicy::default(),
            Duration::from_secs(2),
        );
        let cache = cache();
        cache.mark_pending("e1", "p1").unwrap();
        let queue = WriteQueue::new(cache.clone());

        queue.enqueue(remote.clone(), "e1", participant(1));
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        for score in 2..=4 {
            queue.enqueue(remote.clone(), "e1", participant(score));
        }
        assert_eq!(queue.in_flight(), 1);
        queue.wait_idle().await;

        // Creation, the in-flight write, then one write for the three queued edits.
        assert_eq!(store.write_count(), 3);
        assert_eq!(store.document("e1").unwrap().participants[0].score, 4);
        assert_eq!(queue.in_flight(), 0);
        assert!(cache.pending("e1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let store = MemoryEventStore::default();
        let remote = RemoteEvents::new(
            Arc::new(store.clone()),
            RetryPolicy::default(),
            Duration::from_secs(2),
        );
        let cache = cache();
        cache.mark_pending("missing", "p1").unwrap();
        let queue = WriteQueue::new(cache.clone());

        queue.enqueue(remote, "missing", participant(1));
        queue.wait_idle().await;
        assert_eq!(store.write_count(), 0);
        assert!(cache.pending("missing").unwrap().contains("p1"));
    }
}
