//! One logical source of truth per open view, merged from the remote store
//! and the local cache.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use serde::Deserialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};

use crate::{
    dao::{
        local_cache::CacheStore,
        models::{EventEntity, ParticipantEntity},
    },
    error::SyncError,
    services::{
        change_detection::{has_changed, has_new_participants},
        polling::PollingTask,
        remote_store::{RemoteEvents, Subscription},
        retry::millis,
        write_queue::WriteQueue,
    },
    state::session::{SessionEvent, SessionPhase, SessionStateMachine, SnapshotSource},
};

const UPDATE_CAPACITY: usize = 16;
const UNKNOWN_TITLE: &str = "Unknown Event";

/// Polling periods used by live sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncSettings {
    /// Remote change polling while subscribed.
    #[serde(with = "millis")]
    pub remote_poll_interval: Duration,
    /// Cache key polling when the snapshot came from the cache.
    #[serde(with = "millis")]
    pub cache_poll_interval: Duration,
    /// Manual re-fetch for backends that cannot be subscribed to.
    #[serde(with = "millis")]
    pub fallback_poll_interval: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            remote_poll_interval: Duration::from_secs(2),
            cache_poll_interval: Duration::from_secs(3),
            fallback_poll_interval: Duration::from_secs(5),
        }
    }
}

/// Everything a session needs from the host.
#[derive(Clone)]
pub struct SessionContext {
    /// Remote store, absent in degraded mode.
    pub remote: Option<RemoteEvents>,
    pub cache: Arc<CacheStore>,
    pub writes: WriteQueue,
    pub settings: SyncSettings,
}

/// Which view the session serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Read views: an event without participants counts as missing.
    #[default]
    Results,
    /// Participant entry: a freshly created, still empty event is accepted.
    Entry,
}

/// Options for [`SyncSession::open`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    pub mode: OpenMode,
    /// Keep the snapshot fresh in the background once loaded.
    pub live: bool,
}

/// Notification published when the snapshot changes.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    /// Participant data differs from the previous snapshot.
    Changed(EventEntity),
    /// The participant count grew.
    Joined(EventEntity),
}

struct SessionShared {
    event_id: String,
    snapshot: watch::Sender<Option<EventEntity>>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl SessionShared {
    /// Adopt `incoming` when its participants differ from the current snapshot.
    fn apply(&self, incoming: EventEntity) -> bool {
        let mut joined = false;
        let changed = self.snapshot.send_if_modified(|current| match current {
            Some(existing) if !has_changed(&existing.participants, &incoming.participants) => false,
            slot => {
                joined = slot
                    .as_ref()
                    .is_some_and(|old| has_new_participants(&old.participants, &incoming.participants));
                *slot = Some(incoming.clone());
                true
            }
        });

        if changed {
            debug!(event_id = %self.event_id, joined, "session snapshot updated");
            let _ = self.updates.send(SessionUpdate::Changed(incoming.clone()));
            if joined {
                let _ = self.updates.send(SessionUpdate::Joined(incoming));
            }
        }
        changed
    }
}

enum Watch {
    Remote(Subscription),
    Poll(PollingTask),
}

impl Watch {
    fn cancel(&self) {
        match self {
            Watch::Remote(subscription) => subscription.cancel(),
            Watch::Poll(task) => task.cancel(),
        }
    }
}

/// Synchronization state of one event for one open view.
pub struct SyncSession {
    shared: Arc<SessionShared>,
    phase: Mutex<SessionStateMachine>,
    watch: Mutex<Option<Watch>>,
    context: SessionContext,
}

impl SyncSession {
    /// Load `event_id` from the first source that knows it.
    ///
    /// Source failures are logged and fall through to the next source, so
    /// this never fails: a session nobody knows ends in
    /// [`SessionPhase::NotFound`].
    #[instrument(skip(context), fields(mode = ?options.mode))]
    pub async fn open(context: SessionContext, event_id: &str, options: OpenOptions) -> Self {
        let (snapshot, _rx) = watch::channel(None);
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        let session = Self {
            shared: Arc::new(SessionShared {
                event_id: event_id.to_owned(),
                snapshot,
                updates,
            }),
            phase: Mutex::new(SessionStateMachine::new()),
            watch: Mutex::new(None),
            context,
        };

        let resolved = session.load(options.mode).await;
        let event = match &resolved {
            Some((source, event)) => {
                info!(event_id, source = source.as_str(), participants = event.participants.len(), "event loaded");
                SessionEvent::Resolved(*source)
            }
            None => {
                info!(event_id, "event not found in any source");
                SessionEvent::Missing
            }
        };
        if let Err(err) = session.lock_phase().apply(event) {
            warn!(event_id, error = %err, "ignored session transition");
        }

        if let Some((source, event)) = resolved {
            session.shared.snapshot.send_replace(Some(event));
            if options.live {
                session.start_watch(source);
            }
        }
        session
    }

    async fn load(&self, mode: OpenMode) -> Option<(SnapshotSource, EventEntity)> {
        let event_id = self.event_id();

        let remote_event = match &self.context.remote {
            Some(remote) => match remote.load_event(event_id).await {
                Ok(found) => found.map(|versioned| versioned.event),
                Err(err) if err.allows_fallback() => {
                    warn!(event_id, error = %err, "remote load failed; falling back");
                    None
                }
                Err(err) => {
                    warn!(event_id, error = %err, "remote load rejected");
                    None
                }
            },
            None => {
                debug!(event_id, "no remote store; using local sources only");
                None
            }
        };

        let merged = remote_event.as_ref().map(|event| self.reconcile(event));
        if let Some(event) = remote_event.as_ref().filter(|event| !event.participants.is_empty()) {
            return Some((SnapshotSource::Remote, merged.unwrap_or_else(|| event.clone())));
        }

        let cached = match merged {
            Some(merged) if !merged.participants.is_empty() => Some(merged),
            _ => match self.context.cache.event(event_id) {
                Ok(cached) => cached,
                Err(err) => {
                    warn!(event_id, error = %err, "cached snapshot unreadable");
                    None
                }
            },
        };

        if let Some(event) = cached.as_ref().filter(|event| !event.participants.is_empty()) {
            return Some((SnapshotSource::Cache, event.clone()));
        }

        if let Some(remote) = &self.context.remote {
            match remote.load_detached_participants(event_id).await {
                Ok(participants) if !participants.is_empty() => {
                    let base = remote_event.clone().or_else(|| cached.clone());
                    let event = attach_participants(event_id, base, participants);
                    return Some((SnapshotSource::Detached, event));
                }
                Ok(_) => {}
                Err(err) => warn!(event_id, error = %err, "detached participants unavailable"),
            }
        }

        if mode == OpenMode::Entry {
            if let Some(event) = remote_event {
                return Some((SnapshotSource::Remote, event));
            }
            if let Some(event) = cached {
                return Some((SnapshotSource::Cache, event));
            }
        }

        None
    }

    /// Merge local writes the remote has not seen into `remote_event`, cache
    /// the result and queue those writes again.
    fn reconcile(&self, remote_event: &EventEntity) -> EventEntity {
        let event_id = self.event_id();
        let reconciled = match self.context.cache.reconcile(remote_event) {
            Ok(reconciled) => reconciled,
            Err(err) => {
                warn!(event_id, error = %err, "failed to reconcile cached snapshot");
                return remote_event.clone();
            }
        };

        if let Some(remote) = self.context.remote.as_ref().filter(|_| !reconciled.unsynced.is_empty()) {
            info!(event_id, count = reconciled.unsynced.len(), "replaying unsynced participants");
            for participant in reconciled.unsynced {
                self.context.writes.enqueue(remote.clone(), event_id, participant);
            }
        }
        reconciled.event
    }

    fn start_watch(&self, source: SnapshotSource) {
        let event_id = self.event_id().to_owned();
        let settings = self.context.settings;

        let watch = match (source, &self.context.remote) {
            (SnapshotSource::Remote, Some(remote)) if remote.watchable() => {
                let shared = self.shared.clone();
                Watch::Remote(remote.on_event_update(event_id, move |event| {
                    shared.apply(event);
                }))
            }
            (SnapshotSource::Remote | SnapshotSource::Detached, Some(remote)) => {
                let shared = self.shared.clone();
                let remote = remote.clone();
                Watch::Poll(PollingTask::spawn(
                    "manual remote poll",
                    settings.fallback_poll_interval,
                    move |stop| {
                        let shared = shared.clone();
                        let remote = remote.clone();
                        let event_id = event_id.clone();
                        async move {
                            if let Some(event) = fetch_with_detached(&remote, &event_id).await {
                                if !stop.is_stopped() {
                                    shared.apply(event);
                                }
                            }
                        }
                    },
                ))
            }
            _ => {
                let shared = self.shared.clone();
                let cache = self.context.cache.clone();
                Watch::Poll(PollingTask::spawn(
                    "cache poll",
                    settings.cache_poll_interval,
                    move |stop| {
                        let shared = shared.clone();
                        let cache = cache.clone();
                        let event_id = event_id.clone();
                        async move {
                            match cache.event(&event_id) {
                                Ok(Some(event)) if !stop.is_stopped() => {
                                    shared.apply(event);
                                }
                                Ok(_) => {}
                                Err(err) => warn!(event_id, error = %err, "cache poll failed"),
                            }
                        }
                    },
                ))
            }
        };

        let previous = self.lock_watch().replace(watch);
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    /// Write path for a local edit.
    ///
    /// The snapshot and the local cache are updated before returning; the
    /// remote write is queued and its failures are only logged.
    #[instrument(skip(self, participant), fields(event_id = %self.event_id(), participant_id = %participant.id))]
    pub fn record_participant(&self, participant: ParticipantEntity) -> Result<EventEntity, SyncError> {
        let mut updated = self
            .snapshot()
            .ok_or_else(|| SyncError::NotFound(self.event_id().to_owned()))?;
        updated.upsert_participant(participant.clone());
        self.shared.apply(updated.clone());

        if let Err(err) = self
            .context
            .cache
            .merge_participant(self.event_id(), &participant, Some(&updated))
        {
            warn!(error = %err, "failed to write participant to local cache");
        }

        let participant_id = participant.id.clone();
        match &self.context.remote {
            Some(remote) => self
                .context
                .writes
                .enqueue(remote.clone(), self.event_id(), participant),
            None => debug!("no remote store; participant kept locally"),
        }
        // Marked after queueing: the queue clears the mark once the write lands.
        if let Err(err) = self.context.cache.mark_pending(self.event_id(), &participant_id) {
            warn!(error = %err, "failed to mark participant as pending");
        }

        Ok(updated)
    }

    pub fn event_id(&self) -> &str {
        &self.shared.event_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock_phase().phase()
    }

    /// Current snapshot, `None` until loaded or when not found.
    pub fn snapshot(&self) -> Option<EventEntity> {
        self.shared.snapshot.borrow().clone()
    }

    /// Current snapshot, or `NotFound` when no source knew the event.
    pub fn require_snapshot(&self) -> Result<EventEntity, SyncError> {
        self.snapshot()
            .ok_or_else(|| SyncError::NotFound(self.event_id().to_owned()))
    }

    /// Receive future snapshot changes.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.shared.updates.subscribe()
    }

    /// Whether a background watch is running.
    pub fn is_live(&self) -> bool {
        self.lock_watch().is_some()
    }

    /// Stop background refreshes. Idempotent.
    pub fn close(&self) {
        if let Some(watch) = self.lock_watch().take() {
            watch.cancel();
        }
    }

    fn lock_phase(&self) -> std::sync::MutexGuard<'_, SessionStateMachine> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_watch(&self) -> std::sync::MutexGuard<'_, Option<Watch>> {
        self.watch.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.close();
    }
}

async fn fetch_with_detached(remote: &RemoteEvents, event_id: &str) -> Option<EventEntity> {
    let event = match remote.load_event(event_id).await {
        Ok(found) => found.map(|versioned| versioned.event),
        Err(err) => {
            warn!(event_id, error = %err, "manual remote poll failed");
            return None;
        }
    };

    match remote.load_detached_participants(event_id).await {
        Ok(detached) if !detached.is_empty() => {
            Some(attach_participants(event_id, event, detached))
        }
        Ok(_) => event,
        Err(err) => {
            warn!(event_id, error = %err, "detached participants unavailable");
            event
        }
    }
}

/// Merge detached participant records into `base`, or into a placeholder
/// event when the document itself is missing.
fn attach_participants(
    event_id: &str,
    base: Option<EventEntity>,
    participants: Vec<ParticipantEntity>,
) -> EventEntity {
    let mut event = base.unwrap_or_else(|| EventEntity {
        id: event_id.to_owned(),
        title: UNKNOWN_TITLE.to_owned(),
        pin: String::new(),
        participants: Vec::new(),
        disabled_questions: None,
        created_at: None,
    });
    for participant in participants {
        event.upsert_participant(participant);
    }
    event
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use tokio::time::advance;

    use super::*;
    use crate::{
        dao::{
            answers::Answers,
            event_store::{
                EventStore,
                memory::{MemoryEventStore, MemoryStoreOptions},
            },
            local_cache::MemoryCache,
        },
        services::retry::RetryPolicy,
    };

    fn participant(id: &str, score: i32) -> ParticipantEntity {
        ParticipantEntity {
            id: id.into(),
            name: format!("Bold {id}"),
            avatar: "🐼".into(),
            score,
            answers: Answers::default(),
        }
    }

    fn event(participants: Vec<ParticipantEntity>) -> EventEntity {
        let mut event = EventEntity::new("e1".into(), "Retro".into(), "123456".into(), BTreeSet::new());
        event.participants = participants;
        event
    }

    fn context(store: Option<&MemoryEventStore>) -> SessionContext {
        let cache = CacheStore::new(Arc::new(MemoryCache::new()), 5);
        SessionContext {
            remote: store.map(|store| {
                RemoteEvents::new(
                    Arc::new(store.clone()),
                    RetryPolicy::default(),
                    Duration::from_secs(2),
                )
            }),
            writes: WriteQueue::new(cache.clone()),
            cache,
            settings: SyncSettings::default(),
        }
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn remote_with_participants_wins_and_is_cached() {
        let store = MemoryEventStore::default();
        store.save_event(event(vec![participant("a", 1)])).await.unwrap();
        let ctx = context(Some(&store));

        let session = SyncSession::open(ctx.clone(), "e1", OpenOptions::default()).await;
        assert_eq!(session.phase(), SessionPhase::Ready(SnapshotSource::Remote));
        assert_eq!(ctx.cache.event("e1").unwrap().unwrap().participants.len(), 1);
        assert!(!session.is_live());
    }

    #[tokio::test]
    async fn empty_remote_falls_back_to_cache() {
        let store = MemoryEventStore::default();
        store.save_event(event(Vec::new())).await.unwrap();
        let ctx = context(Some(&store));
        ctx.cache.put_event(&event(vec![participant("a", 2)])).unwrap();

        let session = SyncSession::open(ctx, "e1", OpenOptions::default()).await;
        assert_eq!(session.phase(), SessionPhase::Ready(SnapshotSource::Cache));
        assert_eq!(session.snapshot().unwrap().participants[0].score, 2);
    }

    #[tokio::test]
    async fn unreachable_remote_falls_back_to_cache() {
        let store = MemoryEventStore::default();
        store.set_online(false);
        let ctx = context(Some(&store));
        ctx.cache.put_event(&event(vec![participant("a", 2)])).unwrap();

        let session = SyncSession::open(ctx, "e1", OpenOptions::default()).await;
        assert_eq!(session.phase(), SessionPhase::Ready(SnapshotSource::Cache));
    }

    #[tokio::test]
    async fn detached_participants_attach_to_document() {
        let store = MemoryEventStore::default();
        store.save_event(event(Vec::new())).await.unwrap();
        store.set_detached_participants("e1", vec![participant("x", 3)]);

        let session = SyncSession::open(context(Some(&store)), "e1", OpenOptions::default()).await;
        assert_eq!(session.phase(), SessionPhase::Ready(SnapshotSource::Detached));
        let snapshot = session.snapshot().unwrap();
        assert_eq!(snapshot.title, "Retro");
        assert_eq!(snapshot.participants[0].id, "x");
    }

    #[tokio::test]
    async fn empty_event_is_missing_for_results_but_open_for_entry() {
        let store = MemoryEventStore::default();
        store.save_event(event(Vec::new())).await.unwrap();

        let results = SyncSession::open(context(Some(&store)), "e1", OpenOptions::default()).await;
        assert_eq!(results.phase(), SessionPhase::NotFound);
        assert!(matches!(results.require_snapshot(), Err(SyncError::NotFound(_))));

        let entry = SyncSession::open(
            context(Some(&store)),
            "e1",
            OpenOptions {
                mode: OpenMode::Entry,
                live: false,
            },
        )
        .await;
        assert_eq!(entry.phase(), SessionPhase::Ready(SnapshotSource::Remote));
    }

    #[tokio::test]
    async fn record_participant_writes_cache_then_remote() {
        let store = MemoryEventStore::default();
        store.save_event(event(vec![participant("a", 0)])).await.unwrap();
        let ctx = context(Some(&store));
        let session = SyncSession::open(ctx.clone(), "e1", OpenOptions::default()).await;
        let mut updates = session.subscribe();

        session.record_participant(participant("b", 4)).unwrap();

        assert_eq!(ctx.cache.event("e1").unwrap().unwrap().participants.len(), 2);
        assert!(matches!(updates.try_recv(), Ok(SessionUpdate::Changed(_))));
        assert!(matches!(updates.try_recv(), Ok(SessionUpdate::Joined(_))));

        ctx.writes.wait_idle().await;
        assert_eq!(store.document("e1").unwrap().participant("b").unwrap().score, 4);
        assert!(ctx.cache.pending("e1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_participant_without_remote_stays_local() {
        let ctx = context(None);
        ctx.cache.put_event(&event(vec![participant("a", 0)])).unwrap();
        let session = SyncSession::open(ctx.clone(), "e1", OpenOptions::default()).await;

        session.record_participant(participant("a", 5)).unwrap();
        assert_eq!(ctx.cache.event("e1").unwrap().unwrap().participant("a").unwrap().score, 5);
        assert_eq!(ctx.writes.in_flight(), 0);
        assert!(ctx.cache.pending("e1").unwrap().contains("a"));
    }

    #[tokio::test]
    async fn remote_load_keeps_and_replays_local_only_participants() {
        let store = MemoryEventStore::default();
        store.save_event(event(vec![participant("a", 1)])).await.unwrap();
        let ctx = context(Some(&store));
        ctx.cache
            .put_event(&event(vec![participant("a", 1), participant("b", 6)]))
            .unwrap();
        ctx.cache.mark_pending("e1", "b").unwrap();

        let session = SyncSession::open(ctx.clone(), "e1", OpenOptions::default()).await;
        assert_eq!(session.phase(), SessionPhase::Ready(SnapshotSource::Remote));
        assert_eq!(session.snapshot().unwrap().participants.len(), 2);
        assert_eq!(ctx.cache.event("e1").unwrap().unwrap().participants.len(), 2);

        ctx.writes.wait_idle().await;
        assert_eq!(store.document("e1").unwrap().participant("b").unwrap().score, 6);
        assert!(ctx.cache.pending("e1").unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn live_cache_session_sees_other_writers() {
        let ctx = context(None);
        ctx.cache.put_event(&event(vec![participant("a", 0)])).unwrap();
        let session = SyncSession::open(
            ctx.clone(),
            "e1",
            OpenOptions {
                mode: OpenMode::Results,
                live: true,
            },
        )
        .await;
        let mut updates = session.subscribe();

        ctx.cache
            .merge_participant("e1", &participant("b", 1), None)
            .unwrap();
        advance(Duration::from_secs(3)).await;
        settle().await;

        assert!(matches!(updates.try_recv(), Ok(SessionUpdate::Changed(_))));
        assert_eq!(session.snapshot().unwrap().participants.len(), 2);

        session.close();
        session.close();
        assert!(!session.is_live());
    }

    #[tokio::test(start_paused = true)]
    async fn unwatchable_backend_uses_manual_polling() {
        let store = MemoryEventStore::new(MemoryStoreOptions {
            watchable: false,
            ..MemoryStoreOptions::default()
        });
        store.save_event(event(vec![participant("a", 0)])).await.unwrap();
        let session = SyncSession::open(
            context(Some(&store)),
            "e1",
            OpenOptions {
                mode: OpenMode::Results,
                live: true,
            },
        )
        .await;

        store.set_detached_participants("e1", vec![participant("z", 2)]);
        advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(session.snapshot().unwrap().participants.len(), 1);

        advance(Duration::from_secs(3)).await;
        settle().await;
        assert_eq!(session.snapshot().unwrap().participants.len(), 2);
    }
}
