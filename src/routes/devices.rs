use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get},
};

use crate::{
    dto::device::{ArchiveEntryView, PreferencesView, UpdatePreferencesRequest},
    error::AppError,
    routes::extract::DeviceId,
    services::device_service,
    state::SharedState,
};

/// Device-scoped preferences and archive.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/devices/preferences",
            get(get_preferences).put(update_preferences),
        )
        .route("/devices/archive", get(get_archive))
        .route("/devices/archive/{index}", delete(delete_archive_entry))
}

#[utoipa::path(
    get,
    path = "/devices/preferences",
    tag = "devices",
    params(("X-Device-Id" = String, Header, description = "Device identifier")),
    responses((status = 200, description = "Device preferences", body = PreferencesView))
)]
/// Return the preferences stored for the calling device.
pub async fn get_preferences(
    State(state): State<SharedState>,
    device: DeviceId,
) -> Result<Json<PreferencesView>, AppError> {
    let device_id = device.require()?;
    Ok(Json(device_service::preferences(&state, &device_id)?))
}

#[utoipa::path(
    put,
    path = "/devices/preferences",
    tag = "devices",
    request_body = UpdatePreferencesRequest,
    params(("X-Device-Id" = String, Header, description = "Device identifier")),
    responses(
        (status = 200, description = "Updated preferences", body = PreferencesView),
        (status = 400, description = "Question index out of range")
    )
)]
/// Update the calling device's preferences.
pub async fn update_preferences(
    State(state): State<SharedState>,
    device: DeviceId,
    Json(payload): Json<UpdatePreferencesRequest>,
) -> Result<Json<PreferencesView>, AppError> {
    let device_id = device.require()?;
    Ok(Json(device_service::update_preferences(
        &state, &device_id, payload,
    )?))
}

#[utoipa::path(
    get,
    path = "/devices/archive",
    tag = "devices",
    params(("X-Device-Id" = String, Header, description = "Device identifier")),
    responses((status = 200, description = "Events created on this device", body = [ArchiveEntryView]))
)]
/// List the events the calling device created, most recent first.
pub async fn get_archive(
    State(state): State<SharedState>,
    device: DeviceId,
) -> Result<Json<Vec<ArchiveEntryView>>, AppError> {
    let device_id = device.require()?;
    Ok(Json(device_service::archive(&state, &device_id)?))
}

#[utoipa::path(
    delete,
    path = "/devices/archive/{index}",
    tag = "devices",
    params(
        ("index" = usize, Path, description = "Position in the archive"),
        ("X-Device-Id" = String, Header, description = "Device identifier")
    ),
    responses(
        (status = 200, description = "Removed entry", body = ArchiveEntryView),
        (status = 404, description = "No entry at this position")
    )
)]
/// Remove one entry from the calling device's archive.
pub async fn delete_archive_entry(
    State(state): State<SharedState>,
    Path(index): Path<usize>,
    device: DeviceId,
) -> Result<Json<ArchiveEntryView>, AppError> {
    let device_id = device.require()?;
    Ok(Json(device_service::remove_archive_entry(
        &state, &device_id, index,
    )?))
}
