use serde::Serialize;
use utoipa::ToSchema;

/// Overall service state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    /// No remote store installed; reads and writes go to the local cache only.
    Degraded,
}

/// Body of `GET /healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: HealthStatus,
    /// Whether the installed remote store answered a health probe just now.
    pub remote_reachable: bool,
    /// Participant writes still queued for the remote store.
    pub pending_writes: usize,
}
