use axum::{
    Json, Router,
    extract::{Path, State},
    response::{AppendHeaders, IntoResponse},
    routing::{get, patch, post, put},
};
use axum_valid::Valid;

use crate::{
    dto::event::{
        AnswerRequest, CreateEventRequest, CreateEventResponse, EventEntryView, JoinRequest,
        JoinResponse, ParticipantUpdateResponse, QuestionView, UpdateParticipantRequest,
    },
    error::AppError,
    routes::extract::{DEVICE_HEADER, DeviceId},
    services::event_service,
    state::SharedState,
};

/// Routes for event creation and the participant entry flow.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/questions", get(list_questions))
        .route("/events", post(create_event))
        .route("/events/{id}", get(entry_view))
        .route("/events/{id}/join", post(join_event))
        .route(
            "/events/{id}/participants/{participant_id}/answers/{index}",
            put(record_answer),
        )
        .route(
            "/events/{id}/participants/{participant_id}",
            patch(update_participant),
        )
}

/// List the full question catalog.
#[utoipa::path(
    get,
    path = "/questions",
    tag = "events",
    responses((status = 200, description = "Question catalog", body = [QuestionView]))
)]
pub async fn list_questions(State(state): State<SharedState>) -> Json<Vec<QuestionView>> {
    let catalog = state.questions().enabled(&Default::default());
    Json(catalog.iter().map(QuestionView::from).collect())
}

/// Create an event and add it to the device archive.
#[utoipa::path(
    post,
    path = "/events",
    tag = "events",
    request_body = CreateEventRequest,
    params(("X-Device-Id" = Option<String>, Header, description = "Device creating the event")),
    responses(
        (status = 200, description = "Event created", body = CreateEventResponse),
        (status = 400, description = "Invalid title or question selection")
    )
)]
pub async fn create_event(
    State(state): State<SharedState>,
    device: DeviceId,
    Valid(Json(payload)): Valid<Json<CreateEventRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let cache = state.device_cache(&device.id);
    let created = event_service::create_event(&state, &cache, payload).await?;
    Ok((AppendHeaders([(DEVICE_HEADER, device.id)]), Json(created)))
}

/// Title and enabled questions of an event, before the PIN prompt.
#[utoipa::path(
    get,
    path = "/events/{id}",
    tag = "events",
    params(("id" = String, Path, description = "Event identifier")),
    responses(
        (status = 200, description = "Event entry view", body = EventEntryView),
        (status = 404, description = "Unknown event")
    )
)]
pub async fn entry_view(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<EventEntryView>, AppError> {
    Ok(Json(event_service::entry_view(&state, &id).await?))
}

/// Enter an event with its PIN, or resume as the device's earlier participant.
#[utoipa::path(
    post,
    path = "/events/{id}/join",
    tag = "events",
    request_body = JoinRequest,
    params(
        ("id" = String, Path, description = "Event identifier"),
        ("X-Device-Id" = Option<String>, Header, description = "Device joining the event")
    ),
    responses(
        (status = 200, description = "Participant ready", body = JoinResponse),
        (status = 401, description = "Incorrect PIN"),
        (status = 404, description = "Unknown event")
    )
)]
pub async fn join_event(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    device: DeviceId,
    Valid(Json(payload)): Valid<Json<JoinRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let joined = event_service::join(&state, &device.id, &id, payload).await?;
    Ok((AppendHeaders([(DEVICE_HEADER, device.id)]), Json(joined)))
}

/// Record a yes/no answer for the device's participant.
#[utoipa::path(
    put,
    path = "/events/{id}/participants/{participant_id}/answers/{index}",
    tag = "events",
    request_body = AnswerRequest,
    params(
        ("id" = String, Path, description = "Event identifier"),
        ("participant_id" = String, Path, description = "Participant identifier"),
        ("index" = usize, Path, description = "Catalog index of the question"),
        ("X-Device-Id" = String, Header, description = "Device owning the participant")
    ),
    responses(
        (status = 200, description = "Answer recorded", body = ParticipantUpdateResponse),
        (status = 400, description = "Question not enabled"),
        (status = 401, description = "Participant belongs to another device")
    )
)]
pub async fn record_answer(
    State(state): State<SharedState>,
    Path((id, participant_id, index)): Path<(String, String, usize)>,
    device: DeviceId,
    Json(payload): Json<AnswerRequest>,
) -> Result<Json<ParticipantUpdateResponse>, AppError> {
    let device_id = device.require()?;
    let updated = event_service::record_answer(
        &state,
        &device_id,
        &id,
        &participant_id,
        index,
        payload.answer.into(),
    )
    .await?;
    Ok(Json(updated))
}

/// Rename the device's participant or change its avatar.
#[utoipa::path(
    patch,
    path = "/events/{id}/participants/{participant_id}",
    tag = "events",
    request_body = UpdateParticipantRequest,
    params(
        ("id" = String, Path, description = "Event identifier"),
        ("participant_id" = String, Path, description = "Participant identifier"),
        ("X-Device-Id" = String, Header, description = "Device owning the participant")
    ),
    responses(
        (status = 200, description = "Participant updated", body = ParticipantUpdateResponse),
        (status = 401, description = "Participant belongs to another device")
    )
)]
pub async fn update_participant(
    State(state): State<SharedState>,
    Path((id, participant_id)): Path<(String, String)>,
    device: DeviceId,
    Valid(Json(payload)): Valid<Json<UpdateParticipantRequest>>,
) -> Result<Json<ParticipantUpdateResponse>, AppError> {
    let device_id = device.require()?;
    let updated =
        event_service::update_profile(&state, &device_id, &id, &participant_id, payload).await?;
    Ok(Json(updated))
}
