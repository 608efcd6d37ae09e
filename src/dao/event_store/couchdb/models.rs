use serde::{Deserialize, Serialize};

use crate::dao::models::{EventEntity, Revision, VersionedEvent};

pub const EVENT_PREFIX: &str = "event::";

/// Flat JSON event document as stored in CouchDB.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchEventDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub event: EventEntity,
}

impl From<(EventEntity, Option<Revision>)> for CouchEventDocument {
    fn from((event, rev): (EventEntity, Option<Revision>)) -> Self {
        Self {
            id: event_doc_id(&event.id),
            rev: rev.map(|rev| rev.0),
            event,
        }
    }
}

impl CouchEventDocument {
    /// Convert into the canonical shape, restoring the event id from the
    /// document key when the body does not carry it.
    pub fn into_versioned(self, event_id: &str) -> VersionedEvent {
        let mut event = self.event;
        if event.id.is_empty() {
            event.id = event_id.to_owned();
        }
        VersionedEvent {
            event: event.normalize(),
            revision: self.rev.map(Revision),
        }
    }
}

pub fn event_doc_id(event_id: &str) -> String {
    format!("{}{}", EVENT_PREFIX, event_id)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use serde_json::json;

    use super::*;
    use crate::dao::{
        answers::Answers,
        models::{Answer, ParticipantEntity},
    };

    #[test]
    fn document_round_trip_keeps_event_fields() {
        let mut event = EventEntity::new(
            "k3x9a0b1c".into(),
            "Team Offsite".into(),
            "482913".into(),
            BTreeSet::from([2, 5]),
        );
        event.upsert_participant(ParticipantEntity {
            id: "p1".into(),
            name: "Happy, Tiger".into(),
            avatar: "🐯".into(),
            score: 4,
            answers: [(0, Answer::Yes), (1, Answer::No)].into_iter().collect::<Answers>(),
        });

        let doc = CouchEventDocument::from((event.clone(), Some(Revision("3-abc".into()))));
        let encoded = serde_json::to_value(&doc).unwrap();
        assert_eq!(encoded["_id"], "event::k3x9a0b1c");
        assert_eq!(encoded["_rev"], "3-abc");
        assert_eq!(encoded["disabledQuestions"], json!([2, 5]));

        let decoded: CouchEventDocument = serde_json::from_value(encoded).unwrap();
        let versioned = decoded.into_versioned("k3x9a0b1c");
        assert_eq!(versioned.revision, Some(Revision("3-abc".into())));
        assert_eq!(versioned.event.title, event.title);
        assert_eq!(versioned.event.pin, event.pin);
        assert_eq!(versioned.event.participants, event.participants);
    }

    #[test]
    fn legacy_document_without_id_takes_key() {
        let raw = json!({
            "_id": "event::old",
            "_rev": "1-x",
            "title": "Old",
            "pin": "100000",
            "participants": []
        });
        let doc: CouchEventDocument = serde_json::from_value(raw).unwrap();
        let versioned = doc.into_versioned("old");
        assert_eq!(versioned.event.id, "old");
        assert!(versioned.event.disabled_questions.is_none());
        assert!(versioned.event.created_at.is_none());
    }
}
