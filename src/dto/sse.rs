use serde::Serialize;
use utoipa::ToSchema;

use crate::dto::event::ParticipantView;

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Participant list pushed on `snapshot` and `participants_changed`.
pub struct ParticipantsEvent {
    pub event_id: String,
    pub title: String,
    /// Where the stream's snapshot was loaded from.
    pub source: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
    pub participants: Vec<ParticipantView>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Pushed when the participant count grows.
pub struct ParticipantJoinedEvent {
    pub event_id: String,
    pub count: usize,
}
