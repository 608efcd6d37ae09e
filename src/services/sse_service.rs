use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::{
    dao::models::EventEntity,
    dto::{
        event::ParticipantView,
        sse::{ParticipantJoinedEvent, ParticipantsEvent, ServerEvent},
    },
    error::ServiceError,
    services::sync_engine::{OpenMode, OpenOptions, SessionUpdate, SyncSession},
    state::{SharedState, session::SessionPhase},
};

/// Open a live session for `event_id`.
///
/// Streams accept a freshly created event without participants so an
/// organizer can watch people arrive.
pub async fn open_session(state: &SharedState, event_id: &str) -> Result<SyncSession, ServiceError> {
    let session = SyncSession::open(
        state.session_context().await,
        event_id,
        OpenOptions {
            mode: OpenMode::Entry,
            live: true,
        },
    )
    .await;
    session.require_snapshot()?;
    Ok(session)
}

/// Convert a live session into an SSE response: a `snapshot` first, then
/// `participants_changed` and `participant_joined` as the session sees them.
/// The session is closed once the client disconnects.
pub fn to_sse_stream(
    session: SyncSession,
    degraded: bool,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);
    let mut receiver = session.subscribe();
    let source = match session.phase() {
        SessionPhase::Ready(source) => source.as_str(),
        _ => "unknown",
    };
    let initial = session
        .snapshot()
        .and_then(|event| participants_event("snapshot", &event, source, degraded));

    // forwarder task: owns the session and pushes its updates into mpsc
    tokio::spawn(async move {
        if let Some(event) = initial {
            if tx.send(Ok(to_event(event))).await.is_err() {
                session.close();
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    let payload = match recv_result {
                        Ok(SessionUpdate::Changed(event)) => {
                            participants_event("participants_changed", &event, source, degraded)
                        }
                        Ok(SessionUpdate::Joined(event)) => ServerEvent::json(
                            Some("participant_joined".to_string()),
                            &ParticipantJoinedEvent {
                                event_id: event.id.clone(),
                                count: event.participants.len(),
                            },
                        )
                        .ok(),
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            // Skip lagged messages but keep the stream alive.
                            warn!(skipped, "event stream lagged behind session updates");
                            continue;
                        }
                    };

                    if let Some(payload) = payload {
                        if tx.send(Ok(to_event(payload))).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        session.close();
        info!(event_id = session.event_id(), "event SSE stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn participants_event(
    name: &str,
    event: &EventEntity,
    source: &str,
    degraded: bool,
) -> Option<ServerEvent> {
    ServerEvent::json(
        Some(name.to_string()),
        &ParticipantsEvent {
            event_id: event.id.clone(),
            title: event.title.clone(),
            source: source.to_owned(),
            degraded,
            participants: event.participants.iter().map(ParticipantView::from).collect(),
        },
    )
    .ok()
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}
