//! Participant collection diffing shared by every polling loop.

use std::collections::{HashMap, HashSet};

use crate::dao::models::ParticipantEntity;

/// Whether `new` differs from `old` in a way views care about.
///
/// Reordering alone is not a change; a different id set or a different
/// score, name, avatar or answer set on a shared id is.
pub fn has_changed(old: &[ParticipantEntity], new: &[ParticipantEntity]) -> bool {
    if old.len() != new.len() {
        return true;
    }

    let previous: HashMap<&str, &ParticipantEntity> =
        old.iter().map(|p| (p.id.as_str(), p)).collect();
    let current: HashSet<&str> = new.iter().map(|p| p.id.as_str()).collect();
    if previous.len() != new.len() || current.len() != new.len() {
        // Duplicate ids on either side: the sets cannot line up one to one.
        return true;
    }

    new.iter().any(|current| match previous.get(current.id.as_str()) {
        None => true,
        Some(before) => {
            before.score != current.score
                || before.name != current.name
                || before.avatar != current.avatar
                || before.answers != current.answers
        }
    })
}

/// Whether the participant count grew. Drives "participant joined" notices.
pub fn has_new_participants(old: &[ParticipantEntity], new: &[ParticipantEntity]) -> bool {
    new.len() > old.len()
}
