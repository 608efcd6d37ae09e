use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Spectrum Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::events::list_questions,
        crate::routes::events::create_event,
        crate::routes::events::entry_view,
        crate::routes::events::join_event,
        crate::routes::events::record_answer,
        crate::routes::events::update_participant,
        crate::routes::results::spectrum,
        crate::routes::results::detailed,
        crate::routes::results::export_csv,
        crate::routes::devices::get_preferences,
        crate::routes::devices::update_preferences,
        crate::routes::devices::get_archive,
        crate::routes::devices::delete_archive_entry,
        crate::routes::sse::event_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::event::CreateEventRequest,
            crate::dto::event::CreateEventResponse,
            crate::dto::event::QuestionView,
            crate::dto::event::EventEntryView,
            crate::dto::event::JoinRequest,
            crate::dto::event::JoinResponse,
            crate::dto::event::ParticipantView,
            crate::dto::event::AnswerChoice,
            crate::dto::event::AnswerRequest,
            crate::dto::event::Progress,
            crate::dto::event::ParticipantUpdateResponse,
            crate::dto::event::UpdateParticipantRequest,
            crate::dto::results::SpectrumEntry,
            crate::dto::results::SpectrumResponse,
            crate::dto::results::DetailedRow,
            crate::dto::results::DistributionView,
            crate::dto::results::SummaryView,
            crate::dto::results::DetailedResponse,
            crate::dto::device::PreferencesView,
            crate::dto::device::UpdatePreferencesRequest,
            crate::dto::device::ArchiveEntryView,
            crate::dto::sse::ParticipantsEvent,
            crate::dto::sse::ParticipantJoinedEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "events", description = "Event creation and participant entry"),
        (name = "results", description = "Spectrum, detailed table and CSV export"),
        (name = "devices", description = "Device preferences and event archive"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/events",
            "/events/{id}/join",
            "/events/{id}/export.csv",
            "/devices/archive/{index}",
            "/events/{id}/stream",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
