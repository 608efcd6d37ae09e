//! Remote event operations layered over an [`EventStore`] backend.

use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::{
    dao::{
        event_store::EventStore,
        models::{EventEntity, ParticipantEntity, VersionedEvent},
        storage::StorageError,
    },
    error::SyncError,
    services::{
        change_detection::has_changed,
        polling::{PollingTask, StopSignal},
        retry::RetryPolicy,
    },
};

/// Handle to the remote document store used by sync sessions.
#[derive(Clone)]
pub struct RemoteEvents {
    store: Arc<dyn EventStore>,
    retry: RetryPolicy,
    poll_interval: Duration,
}

impl RemoteEvents {
    pub fn new(store: Arc<dyn EventStore>, retry: RetryPolicy, poll_interval: Duration) -> Self {
        Self {
            store,
            retry,
            poll_interval,
        }
    }

    /// Whether [`RemoteEvents::on_event_update`] is backed by the store.
    pub fn watchable(&self) -> bool {
        self.store.watchable()
    }

    /// Fetch an event. `Ok(None)` when no document exists.
    pub async fn load_event(&self, event_id: &str) -> Result<Option<VersionedEvent>, SyncError> {
        self.store
            .load_event(event_id.to_owned())
            .await
            .map_err(SyncError::from)
    }

    /// Create or overwrite the whole event document.
    pub async fn save_event(&self, event: EventEntity) -> Result<(), SyncError> {
        self.store.save_event(event).await.map_err(SyncError::from)
    }

    /// Participant records the backend keeps outside the event document.
    pub async fn load_detached_participants(
        &self,
        event_id: &str,
    ) -> Result<Vec<ParticipantEntity>, SyncError> {
        self.store
            .load_detached_participants(event_id.to_owned())
            .await
            .map_err(SyncError::from)
    }

    /// Read the document, splice `participant` in by id and write it back
    /// conditioned on the revision that was read. Lost races are retried
    /// under the configured policy; a missing document is not.
    #[instrument(skip(self, participant), fields(participant_id = %participant.id))]
    pub async fn update_participant(
        &self,
        event_id: &str,
        participant: ParticipantEntity,
    ) -> Result<(), SyncError> {
        self.retry
            .run(
                "update participant",
                |attempt| {
                    let store = self.store.clone();
                    let event_id = event_id.to_owned();
                    let participant = participant.clone();
                    async move {
                        let current = store
                            .load_event(event_id.clone())
                            .await?
                            .ok_or_else(|| StorageError::not_found(event_id.clone()))?;
                        let mut event = current.event;
                        event.upsert_participant(participant);
                        if current.revision.is_none() && attempt == 1 {
                            debug!(event_id, "backend has no revision; writing unconditionally");
                        }
                        store.replace_event(event, current.revision).await
                    }
                },
                StorageError::is_conflict,
            )
            .await
            .map_err(SyncError::from)
    }

    /// Poll the event every `poll_interval` and hand `callback` every
    /// snapshot whose participants differ from the last one delivered.
    /// The first successful poll is always delivered.
    pub fn on_event_update<F>(&self, event_id: String, callback: F) -> Subscription
    where
        F: FnMut(EventEntity) + Send + 'static,
    {
        let remote = self.clone();
        let watcher = Arc::new(Mutex::new(Watcher {
            last_seen: None,
            callback,
        }));

        let task = PollingTask::spawn("remote event poll", self.poll_interval, move |stop| {
            let remote = remote.clone();
            let watcher = watcher.clone();
            let event_id = event_id.clone();
            async move { poll_once(&remote, &event_id, &watcher, &stop).await }
        });

        Subscription { task }
    }
}

struct Watcher<F> {
    last_seen: Option<EventEntity>,
    callback: F,
}

async fn poll_once<F>(remote: &RemoteEvents, event_id: &str, watcher: &Mutex<Watcher<F>>, stop: &StopSignal)
where
    F: FnMut(EventEntity),
{
    let event = match remote.load_event(event_id).await {
        Ok(Some(versioned)) => versioned.event,
        Ok(None) => {
            debug!(event_id, "polled event has no document");
            return;
        }
        Err(err) => {
            warn!(event_id, error = %err, "remote poll failed");
            return;
        }
    };

    if stop.is_stopped() {
        return;
    }

    let mut watcher = watcher.lock().await;
    let changed = watcher
        .last_seen
        .as_ref()
        .is_none_or(|last| has_changed(&last.participants, &event.participants));
    if changed {
        watcher.last_seen = Some(event.clone());
        (watcher.callback)(event);
    }
}

/// Live change subscription. Cancelling or dropping it stops polling.
pub struct Subscription {
    task: PollingTask,
}

impl Subscription {
    /// Stop future polls. Idempotent; an in-flight poll still completes.
    pub fn cancel(&self) {
        self.task.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.is_cancelled()
    }
}
