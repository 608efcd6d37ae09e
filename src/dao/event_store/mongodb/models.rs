use std::{collections::BTreeSet, time::SystemTime};

use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use serde_with::{DefaultOnNull, serde_as};
use time::OffsetDateTime;

use crate::dao::models::{EventEntity, ParticipantEntity, Revision, VersionedEvent, deserialize_pin};

/// Structured event document stored in the `events` collection.
///
/// `revision` is bumped on every conditional write and serves as the version
/// marker for optimistic concurrency. Documents written before versioning
/// carry no `revision` and are treated as revision 0.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoEventDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<i64>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "deserialize_pin")]
    pub pin: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub participants: Vec<ParticipantEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_questions: Option<BTreeSet<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl MongoEventDocument {
    pub fn from_entity(event: EventEntity, revision: i64) -> Self {
        Self {
            id: event.id,
            revision: Some(revision),
            title: event.title,
            pin: event.pin,
            participants: event.participants,
            disabled_questions: event.disabled_questions,
            created_at: event
                .created_at
                .map(|at| DateTime::from_system_time(SystemTime::from(at))),
        }
    }

    pub fn revision(&self) -> i64 {
        self.revision.unwrap_or(0)
    }

    pub fn into_versioned(self) -> VersionedEvent {
        let revision = Revision(self.revision().to_string());
        let event = EventEntity {
            id: self.id,
            title: self.title,
            pin: self.pin,
            participants: self.participants,
            disabled_questions: self.disabled_questions,
            created_at: self
                .created_at
                .map(|at| OffsetDateTime::from(at.to_system_time())),
        };
        VersionedEvent {
            event: event.normalize(),
            revision: Some(revision),
        }
    }
}

pub fn doc_id(id: &str) -> Document {
    doc! {"_id": id}
}

/// Filter matching `id` only while it is still at `revision`. Revision 0 also
/// matches unversioned documents.
pub fn doc_id_at_revision(id: &str, revision: i64) -> Document {
    if revision == 0 {
        doc! {
            "_id": id,
            "$or": [
                { "revision": 0_i64 },
                { "revision": { "$exists": false } },
            ],
        }
    } else {
        doc! {"_id": id, "revision": revision}
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::{deserialize_from_document, serialize_to_document};

    use super::*;
    use crate::dao::{answers::Answers, models::Answer};

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
            name: "Happy Tiger".into(),
            avatar: "🐯".into(),
            score: 4,
            answers: [(0, Answer::Yes), (1, Answer::No)].into_iter().collect::<Answers>(),
        });

        let encoded = serialize_to_document(&MongoEventDocument::from_entity(event.clone(), 3)).unwrap();
        assert_eq!(encoded.get_str("_id").unwrap(), "k3x9a0b1c");
        assert_eq!(encoded.get_i64("revision").unwrap(), 3);
        assert!(encoded.contains_key("disabledQuestions"));

        let decoded: MongoEventDocument = deserialize_from_document(encoded).unwrap();
        let versioned = decoded.into_versioned();
        assert_eq!(versioned.revision, Some(Revision("3".into())));
        assert_eq!(versioned.event.title, event.title);
        assert_eq!(versioned.event.pin, event.pin);
        assert_eq!(versioned.event.participants, event.participants);
        assert_eq!(versioned.event.disabled_questions, Some(BTreeSet::from([2, 5])));
    }

    #[test]
    fn legacy_document_decodes_as_revision_zero() {
        let legacy = doc! {
            "_id": "old",
            "title": "Old",
            "pin": 123456,
            "participants": [
                { "name": "Brave Fox", "avatar": "🦊", "score": 3, "answers": { "1": 1 } },
            ],
        };

        let decoded: MongoEventDocument = deserialize_from_document(legacy).unwrap();
        assert_eq!(decoded.revision, None);
        let versioned = decoded.into_versioned();
        assert_eq!(versioned.revision, Some(Revision("0".into())));
        assert_eq!(versioned.event.pin, "123456");
        assert_eq!(versioned.event.participants.len(), 1);
        assert_eq!(versioned.event.participants[0].answers.get(1), Some(Answer::Yes));
        assert!(versioned.event.disabled_questions.is_none());
    }

    #[test]
    fn null_fields_decode_as_empty() {
        let legacy = doc! { "_id": "nulls", "title": null, "pin": null, "participants": null };
        let versioned = deserialize_from_document::<MongoEventDocument>(legacy)
            .unwrap()
            .into_versioned();
        assert!(versioned.event.title.is_empty());
        assert!(versioned.event.pin.is_empty());
        assert!(versioned.event.participants.is_empty());
    }

    #[test]
    fn revision_zero_filter_also_matches_unversioned_documents() {
        let filter = doc_id_at_revision("old", 0);
        let branches = filter.get_array("$or").unwrap();
        assert_eq!(branches.len(), 2);
        assert_eq!(
            branches[1].as_document().unwrap().get_document("revision").unwrap(),
            &doc! { "$exists": false }
        );

        let versioned = doc_id_at_revision("e1", 4);
        assert_eq!(versioned.get_i64("revision").unwrap(), 4);
        assert!(!versioned.contains_key("$or"));
    }
}
