//! Organizer and participant operations on a single event.

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::{
    dao::{
        local_cache::DeviceCache,
        models::{Answer, ArchiveEntry, EventEntity, ParticipantEntity},
    },
    dto::{
        event::{
            CreateEventRequest, CreateEventResponse, EventEntryView, JoinRequest, JoinResponse,
            ParticipantUpdateResponse, ParticipantView, Progress, QuestionView,
            UpdateParticipantRequest,
        },
        format_timestamp,
    },
    error::ServiceError,
    services::{
        identity::{generate_event_id, generate_participant_id, generate_participant_identity, generate_pin},
        questions::EnabledQuestion,
        scoring::compute_score,
        sync_engine::{OpenMode, OpenOptions, SyncSession},
    },
    state::SharedState,
};

const ENTRY: OpenOptions = OpenOptions {
    mode: OpenMode::Entry,
    live: false,
};

/// Create an event, store it remotely when possible and remember it on the device.
pub async fn create_event(
    state: &SharedState,
    device: &DeviceCache,
    request: CreateEventRequest,
) -> Result<CreateEventResponse, ServiceError> {
    let catalog_len = state.questions().len();
    let disabled: BTreeSet<usize> = match request.disabled_questions {
        Some(indices) => indices.into_iter().collect(),
        None => device.disabled_questions()?,
    };
    if let Some(out_of_range) = disabled.iter().find(|index| **index >= catalog_len) {
        return Err(ServiceError::InvalidInput(format!(
            "question index {out_of_range} is out of range"
        )));
    }
    if disabled.len() >= catalog_len {
        return Err(ServiceError::InvalidInput(
            "at least one question must stay enabled".into(),
        ));
    }

    let event = EventEntity::new(
        generate_event_id(),
        request.title.trim().to_owned(),
        generate_pin(),
        disabled,
    );

    let stored_remotely = match state.remote().await {
        Some(remote) => match remote.save_event(event.clone()).await {
            Ok(()) => true,
            Err(err) => {
                warn!(event_id = %event.id, error = %err, "remote save failed; event kept in local cache");
                false
            }
        },
        None => false,
    };
    state.cache().put_event(&event)?;

    let url = state.config().participant_url(&event.id);
    device.push_archive(ArchiveEntry {
        id: event.id.clone(),
        title: event.title.clone(),
        pin: event.pin.clone(),
        url: url.clone(),
        created_at: event.created_at,
    })?;

    info!(event_id = %event.id, stored_remotely, "event created");
    Ok(CreateEventResponse {
        id: event.id,
        title: event.title,
        pin: event.pin,
        url,
        disabled_questions: event
            .disabled_questions
            .map(|set| set.into_iter().collect())
            .unwrap_or_default(),
        created_at: event.created_at.map(format_timestamp).unwrap_or_default(),
        stored_remotely,
    })
}

/// Title and enabled questions, shown before the PIN prompt.
pub async fn entry_view(state: &SharedState, event_id: &str) -> Result<EventEntryView, ServiceError> {
    let session = SyncSession::open(state.session_context().await, event_id, ENTRY).await;
    let event = session.require_snapshot()?;
    let questions = state.questions().enabled_for(&event);

    Ok(EventEntryView {
        id: event.id,
        title: event.title,
        questions: questions.iter().map(QuestionView::from).collect(),
    })
}

/// Enter an event.
///
/// A device that joined before gets its participant back without a PIN;
/// everyone else needs the event PIN and receives a fresh identity.
pub async fn join(
    state: &SharedState,
    device_id: &str,
    event_id: &str,
    request: JoinRequest,
) -> Result<JoinResponse, ServiceError> {
    let session = SyncSession::open(state.session_context().await, event_id, ENTRY).await;
    let event = session.require_snapshot()?;
    let device = state.device_cache(device_id);

    let (participant, returning) = match device.participant(event_id)? {
        Some(saved) => {
            if event.participant(&saved.id).is_none() {
                // The earlier remote write never landed; attach the local copy again.
                session.record_participant(saved.clone())?;
            }
            (saved, true)
        }
        None => {
            if request.pin.as_deref() != Some(event.pin.as_str()) || event.pin.is_empty() {
                warn!(event_id, "join rejected: incorrect PIN");
                return Err(ServiceError::Unauthorized("incorrect PIN".into()));
            }

            let (name, avatar) = generate_participant_identity();
            let participant = ParticipantEntity {
                id: generate_participant_id(),
                name,
                avatar,
                score: 0,
                answers: Default::default(),
            };
            device.set_participant(event_id, &participant)?;
            session.record_participant(participant.clone())?;
            info!(event_id, participant_id = %participant.id, "participant joined");
            (participant, false)
        }
    };

    let questions = state.questions().enabled_for(&event);
    Ok(JoinResponse {
        event_id: event.id,
        title: event.title,
        device_id: device_id.to_owned(),
        returning,
        progress: progress(&participant, &questions),
        participant: ParticipantView::from(&participant),
        questions: questions.iter().map(QuestionView::from).collect(),
    })
}

/// Record one yes/no answer and recompute the score.
pub async fn record_answer(
    state: &SharedState,
    device_id: &str,
    event_id: &str,
    participant_id: &str,
    index: usize,
    answer: Answer,
) -> Result<ParticipantUpdateResponse, ServiceError> {
    let session = SyncSession::open(state.session_context().await, event_id, ENTRY).await;
    let event = session.require_snapshot()?;
    let questions = state.questions().enabled_for(&event);
    if !questions.iter().any(|q| q.index == index) {
        return Err(ServiceError::InvalidInput(format!(
            "question {index} is not enabled for this event"
        )));
    }

    let device = state.device_cache(device_id);
    let mut participant = own_participant(&device, &event, participant_id)?;
    participant.answers.set(index, answer);
    participant.score = compute_score(&participant, &questions);

    device.set_participant(event_id, &participant)?;
    session.record_participant(participant.clone())?;

    Ok(ParticipantUpdateResponse {
        progress: progress(&participant, &questions),
        participant: ParticipantView::from(&participant),
    })
}

/// Rename a participant or change their avatar.
pub async fn update_profile(
    state: &SharedState,
    device_id: &str,
    event_id: &str,
    participant_id: &str,
    request: UpdateParticipantRequest,
) -> Result<ParticipantUpdateResponse, ServiceError> {
    let session = SyncSession::open(state.session_context().await, event_id, ENTRY).await;
    let event = session.require_snapshot()?;
    let questions = state.questions().enabled_for(&event);

    let device = state.device_cache(device_id);
    let mut participant = own_participant(&device, &event, participant_id)?;
    if let Some(name) = request.name {
        participant.name = name.trim().to_owned();
    }
    if let Some(avatar) = request.avatar {
        participant.avatar = avatar.trim().to_owned();
    }

    device.set_participant(event_id, &participant)?;
    session.record_participant(participant.clone())?;

    Ok(ParticipantUpdateResponse {
        progress: progress(&participant, &questions),
        participant: ParticipantView::from(&participant),
    })
}

/// The device's own copy of its participant. Only this device edits it, so
/// the copy is never older than the remote one.
fn own_participant(
    device: &DeviceCache,
    event: &EventEntity,
    participant_id: &str,
) -> Result<ParticipantEntity, ServiceError> {
    device
        .participant(&event.id)?
        .filter(|saved| saved.id == participant_id)
        .ok_or_else(|| ServiceError::Unauthorized("participant belongs to another device".into()))
}

fn progress(participant: &ParticipantEntity, questions: &[EnabledQuestion]) -> Progress {
    Progress {
        answered: questions
            .iter()
            .filter(|q| participant.answers.get(q.index).is_some())
            .count(),
        total: questions.len(),
    }
}
