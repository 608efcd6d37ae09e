use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{error::AppError, services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/events/{id}/stream",
    tag = "sse",
    params(("id" = String, Path, description = "Event identifier")),
    responses(
        (status = 200, description = "Live participant updates", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown event")
    )
)]
/// Stream `snapshot`, `participants_changed` and `participant_joined` events for one event.
pub async fn event_stream(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>>, AppError> {
    let session = sse_service::open_session(&state, &id).await?;
    info!(event_id = %id, "new event SSE connection");
    Ok(sse_service::to_sse_stream(session, state.is_degraded().await))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/events/{id}/stream", get(event_stream))
}
