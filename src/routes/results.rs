use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
    routing::get,
};

use crate::{
    dto::results::{DetailedQuery, DetailedResponse, SpectrumResponse},
    error::AppError,
    services::results_service,
    state::SharedState,
};

/// Read-only results views.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/events/{id}/results", get(spectrum))
        .route("/events/{id}/detailed", get(detailed))
        .route("/events/{id}/export.csv", get(export_csv))
}

#[utoipa::path(
    get,
    path = "/events/{id}/results",
    tag = "results",
    params(("id" = String, Path, description = "Event identifier")),
    responses(
        (status = 200, description = "Participants on the score spectrum", body = SpectrumResponse),
        (status = 404, description = "Unknown event or no participants yet")
    )
)]
/// Place every participant on the score spectrum.
pub async fn spectrum(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SpectrumResponse>, AppError> {
    Ok(Json(results_service::spectrum(&state, &id).await?))
}

#[utoipa::path(
    get,
    path = "/events/{id}/detailed",
    tag = "results",
    params(("id" = String, Path, description = "Event identifier"), DetailedQuery),
    responses(
        (status = 200, description = "Detailed results table", body = DetailedResponse),
        (status = 400, description = "Unknown sort option"),
        (status = 404, description = "Unknown event or no participants yet")
    )
)]
/// Sortable, searchable results table with per-question statistics.
pub async fn detailed(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<DetailedQuery>,
) -> Result<Json<DetailedResponse>, AppError> {
    Ok(Json(results_service::detailed(&state, &id, query).await?))
}

#[utoipa::path(
    get,
    path = "/events/{id}/export.csv",
    tag = "results",
    params(("id" = String, Path, description = "Event identifier"), DetailedQuery),
    responses(
        (status = 200, description = "CSV download", content_type = "text/csv", body = String),
        (status = 404, description = "Unknown event or no participants yet")
    )
)]
/// Download the detailed table as CSV.
pub async fn export_csv(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<DetailedQuery>,
) -> Result<Response, AppError> {
    let export = results_service::export(&state, &id, query).await?;
    let disposition = HeaderValue::from_str(&content_disposition(&export.filename))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/csv; charset=utf-8")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export.content,
    )
        .into_response())
}

/// `attachment` disposition with an ASCII fallback name and the exact name
/// percent-encoded.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            ' '..='~' if c != '"' && c != '\\' => c,
            _ => '_',
        })
        .collect();

    let mut encoded = String::with_capacity(filename.len());
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || b"-._~".contains(&byte) {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }

    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_escapes_non_ascii_titles() {
        let value = content_disposition("Été \"team\"-detailed-results-2024-03-07.csv");
        assert!(value.starts_with("attachment; filename=\"_t_ _team_-detailed"));
        assert!(value.contains("filename*=UTF-8''%C3%89t%C3%A9%20%22team%22-detailed"));
        assert!(HeaderValue::from_str(&value).is_ok());
    }
}
