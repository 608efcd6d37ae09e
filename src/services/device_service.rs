//! Device-scoped preferences and archive of created events.

use crate::{
    dto::device::{ArchiveEntryView, PreferencesView, UpdatePreferencesRequest},
    error::ServiceError,
    state::SharedState,
};

pub fn preferences(state: &SharedState, device_id: &str) -> Result<PreferencesView, ServiceError> {
    let device = state.device_cache(device_id);
    Ok(PreferencesView {
        disabled_questions: device.disabled_questions()?.into_iter().collect(),
        cookie_consent: device.cookie_consent()?,
    })
}

/// Apply the fields present in `request`.
pub fn update_preferences(
    state: &SharedState,
    device_id: &str,
    request: UpdatePreferencesRequest,
) -> Result<PreferencesView, ServiceError> {
    let device = state.device_cache(device_id);

    if let Some(indices) = request.disabled_questions {
        let catalog_len = state.questions().len();
        if let Some(index) = indices.iter().find(|index| **index >= catalog_len) {
            return Err(ServiceError::InvalidInput(format!(
                "question index {index} is out of range"
            )));
        }
        device.set_disabled_questions(&indices.into_iter().collect())?;
    }
    if let Some(accepted) = request.cookie_consent {
        device.set_cookie_consent(accepted)?;
    }

    preferences(state, device_id)
}

/// Events this device created, most recent first.
pub fn archive(state: &SharedState, device_id: &str) -> Result<Vec<ArchiveEntryView>, ServiceError> {
    Ok(state
        .device_cache(device_id)
        .archive()?
        .into_iter()
        .map(ArchiveEntryView::from)
        .collect())
}

/// Forget one archived event.
pub fn remove_archive_entry(
    state: &SharedState,
    device_id: &str,
    index: usize,
) -> Result<ArchiveEntryView, ServiceError> {
    state
        .device_cache(device_id)
        .remove_archive(index)?
        .map(ArchiveEntryView::from)
        .ok_or_else(|| ServiceError::NotFound(format!("archive entry {index}")))
}
