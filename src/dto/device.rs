//! DTO definitions for device-scoped preferences and the event archive.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{dao::models::ArchiveEntry, dto::format_timestamp};

/// Preferences remembered per device.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesView {
    /// Questions pre-disabled when this device creates an event.
    pub disabled_questions: Vec<usize>,
    pub cookie_consent: bool,
}

/// Partial preference update; absent fields are left unchanged.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePreferencesRequest {
    pub disabled_questions: Option<Vec<usize>>,
    pub cookie_consent: Option<bool>,
}

/// An event this device created.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntryView {
    pub id: String,
    pub title: String,
    pub pin: String,
    pub url: String,
    pub created_at: Option<String>,
}

impl From<ArchiveEntry> for ArchiveEntryView {
    fn from(entry: ArchiveEntry) -> Self {
        Self {
            id: entry.id,
            title: entry.title,
            pin: entry.pin,
            url: entry.url,
            created_at: entry.created_at.map(format_timestamp),
        }
    }
}
