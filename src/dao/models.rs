use std::{collections::BTreeSet, fmt};

use indexmap::IndexMap;
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, Visitor},
};
use serde_with::{DefaultOnNull, serde_as};
use time::OffsetDateTime;

use crate::dao::answers::Answers;

/// A single yes/no answer. Stored on the wire as `1` (yes) or `0` (no).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Answer {
    /// The participant answered "no".
    No,
    /// The participant answered "yes".
    Yes,
}

impl Answer {
    /// Wire flag for this answer.
    pub fn as_flag(self) -> u8 {
        match self {
            Answer::No => 0,
            Answer::Yes => 1,
        }
    }

    /// Parse a wire flag, rejecting anything other than `0` and `1`.
    pub fn from_flag(flag: i64) -> Option<Self> {
        match flag {
            0 => Some(Answer::No),
            1 => Some(Answer::Yes),
            _ => None,
        }
    }

    /// Ordinal used when ranking by a question column: yes=1, no=0, unanswered=-1.
    pub fn ordinal(answer: Option<Answer>) -> i8 {
        match answer {
            Some(Answer::Yes) => 1,
            Some(Answer::No) => 0,
            None => -1,
        }
    }

    pub fn is_yes(self) -> bool {
        matches!(self, Answer::Yes)
    }
}

impl Serialize for Answer {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i32(i32::from(self.as_flag()))
    }
}

impl<'de> Deserialize<'de> for Answer {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AnswerVisitor;

        impl Visitor<'_> for AnswerVisitor {
            type Value = Answer;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an answer flag (0 or 1)")
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Answer, E> {
                Answer::from_flag(value)
                    .ok_or_else(|| E::invalid_value(de::Unexpected::Signed(value), &self))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Answer, E> {
                i64::try_from(value)
                    .ok()
                    .and_then(Answer::from_flag)
                    .ok_or_else(|| E::invalid_value(de::Unexpected::Unsigned(value), &self))
            }

            fn visit_f64<E: de::Error>(self, value: f64) -> Result<Answer, E> {
                if value == 0.0 {
                    Ok(Answer::No)
                } else if value == 1.0 {
                    Ok(Answer::Yes)
                } else {
                    Err(E::invalid_value(de::Unexpected::Float(value), &self))
                }
            }

            fn visit_bool<E: de::Error>(self, value: bool) -> Result<Answer, E> {
                Ok(if value { Answer::Yes } else { Answer::No })
            }
        }

        deserializer.deserialize_any(AnswerVisitor)
    }
}

/// Canonical participant record shared by every storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "StoredParticipant")]
pub struct ParticipantEntity {
    /// Opaque identifier, unique within the event.
    pub id: String,
    /// Display name, editable by the participant.
    pub name: String,
    /// Single glyph avatar.
    pub avatar: String,
    /// Cached score; always recomputed from `answers` on change.
    pub score: i32,
    /// Recorded answers keyed by question index.
    pub answers: Answers,
}

/// Participant shapes found in stored documents.
///
/// Older documents written through the structured-field API kept each
/// participant as a JSON string, newer ones store plain objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredParticipant {
    Document(RawParticipant),
    Encoded(String),
}

#[serde_as]
#[derive(Deserialize)]
struct RawParticipant {
    #[serde(default)]
    id: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    name: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    avatar: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    score: i32,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    answers: Answers,
}

impl TryFrom<StoredParticipant> for ParticipantEntity {
    type Error = String;

    fn try_from(value: StoredParticipant) -> Result<Self, Self::Error> {
        let raw = match value {
            StoredParticipant::Document(raw) => raw,
            StoredParticipant::Encoded(encoded) => serde_json::from_str::<RawParticipant>(&encoded)
                .map_err(|err| format!("invalid encoded participant: {err}"))?,
        };

        let id = raw
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| legacy_participant_id(&raw.name));

        Ok(Self {
            id,
            name: raw.name,
            avatar: raw.avatar,
            score: raw.score,
            answers: raw.answers,
        })
    }
}

/// Identifier assigned to participants written before ids existed; those
/// records were matched by display name.
pub fn legacy_participant_id(name: &str) -> String {
    format!("legacy:{name}")
}

/// Canonical event document, independent of the backend encoding.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventEntity {
    /// Document key.
    #[serde(default)]
    pub id: String,
    /// Organizer supplied title.
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub title: String,
    /// Six digit entry PIN.
    #[serde(default, deserialize_with = "deserialize_pin")]
    pub pin: String,
    /// Participant collection; unique by id after [`EventEntity::normalize`].
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub participants: Vec<ParticipantEntity>,
    /// Questions switched off at creation time. `None` on legacy events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_questions: Option<BTreeSet<usize>>,
    /// Creation timestamp. Absent on legacy events.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
}

impl EventEntity {
    /// Build a fresh event without participants.
    pub fn new(
        id: String,
        title: String,
        pin: String,
        disabled_questions: BTreeSet<usize>,
    ) -> Self {
        Self {
            id,
            title,
            pin,
            participants: Vec::new(),
            disabled_questions: Some(disabled_questions),
            created_at: Some(OffsetDateTime::now_utc()),
        }
    }

    /// Collapse duplicate participant ids, keeping the first position and the
    /// last written value.
    pub fn normalize(mut self) -> Self {
        if self.participants.len() < 2 {
            return self;
        }

        let mut unique: IndexMap<String, ParticipantEntity> =
            IndexMap::with_capacity(self.participants.len());
        for participant in self.participants.drain(..) {
            unique.insert(participant.id.clone(), participant);
        }
        self.participants = unique.into_values().collect();
        self
    }

    /// Replace the participant with the same id, or append it.
    ///
    /// Returns `true` when an existing entry was replaced.
    pub fn upsert_participant(&mut self, participant: ParticipantEntity) -> bool {
        match self
            .participants
            .iter_mut()
            .find(|existing| existing.id == participant.id)
        {
            Some(slot) => {
                *slot = participant;
                true
            }
            None => {
                self.participants.push(participant);
                false
            }
        }
    }

    /// Look up a participant by id.
    pub fn participant(&self, id: &str) -> Option<&ParticipantEntity> {
        self.participants.iter().find(|p| p.id == id)
    }
}

/// Opaque server-side version marker (CouchDB `_rev`, MongoDB revision counter, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(pub String);

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Event document together with the version marker it was read at.
#[derive(Debug, Clone)]
pub struct VersionedEvent {
    pub event: EventEntity,
    /// `None` when the backend exposes no version marker.
    pub revision: Option<Revision>,
}

/// Entry of a device's archive of created events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntry {
    pub id: String,
    pub title: String,
    pub pin: String,
    pub url: String,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<OffsetDateTime>,
}

/// Accepts PINs stored as strings or as numbers.
pub(crate) fn deserialize_pin<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct PinVisitor;

    impl Visitor<'_> for PinVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a PIN as string or number")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<String, E> {
            Ok(value.to_owned())
        }

        fn visit_string<E: de::Error>(self, value: String) -> Result<String, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<String, E> {
            Ok(value.to_string())
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<String, E> {
            if value.fract() == 0.0 && value >= 0.0 {
                Ok(format!("{value:.0}"))
            } else {
                Err(E::invalid_value(de::Unexpected::Float(value), &self))
            }
        }

        fn visit_unit<E: de::Error>(self) -> Result<String, E> {
            Ok(String::new())
        }

        fn visit_none<E: de::Error>(self) -> Result<String, E> {
            Ok(String::new())
        }
    }

    deserializer.deserialize_any(PinVisitor)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_legacy_participant_shapes() {
        let value = json!({
            "title": "Legacy",
            "pin": 123456,
            "participants": [
                { "name": "Brave Fox", "avatar": "🦊", "score": 3, "answers": [null, 1, 0] },
                "{\"id\":\"p-2\",\"name\":\"Calm Owl\",\"avatar\":\"🐼\",\"score\":0,\"answers\":{\"4\":0}}"
            ]
        });

        let event: EventEntity = serde_json::from_value(value).unwrap();
        assert_eq!(event.pin, "123456");
        assert_eq!(event.disabled_questions, None);
        assert_eq!(event.participants[0].id, "legacy:Brave Fox");
        assert_eq!(event.participants[0].answers.get(1), Some(Answer::Yes));
        assert_eq!(event.participants[0].answers.get(2), Some(Answer::No));
        assert_eq!(event.participants[0].answers.get(0), None);
        assert_eq!(event.participants[1].id, "p-2");
        assert_eq!(event.participants[1].answers.get(4), Some(Answer::No));
    }

    #[test]
    fn float_pins_must_be_whole() {
        let event: EventEntity = serde_json::from_value(json!({ "pin": 654321.0 })).unwrap();
        assert_eq!(event.pin, "654321");
        assert!(serde_json::from_value::<EventEntity>(json!({ "pin": 12.5 })).is_err());
    }

    #[test]
    fn null_collections_decode_as_empty() {
        let value = json!({ "title": null, "pin": "654321", "participants": null });
        let event: EventEntity = serde_json::from_value(value).unwrap();
        assert!(event.title.is_empty());
        assert!(event.participants.is_empty());
    }

    #[test]
    fn upsert_replaces_by_id() {
        let mut event = EventEntity::new("e1".into(), "T".into(), "111111".into(), BTreeSet::new());
        let mut p = participant("a", "Kind Bear");
        assert!(!event.upsert_participant(p.clone()));
        p.name = "Wise Bear".into();
        assert!(event.upsert_participant(p));
        assert_eq!(event.participants.len(), 1);
        assert_eq!(event.participants[0].name, "Wise Bear");
    }

    #[test]
    fn normalize_collapses_duplicate_ids() {
        let mut event = EventEntity::new("e1".into(), "T".into(), "111111".into(), BTreeSet::new());
        event.participants = vec![
            participant("a", "first"),
            participant("b", "other"),
            participant("a", "second"),
        ];
        let event = event.normalize();
        let names: Vec<_> = event.participants.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["second", "other"]);
    }

    fn participant(id: &str, name: &str) -> ParticipantEntity {
        ParticipantEntity {
            id: id.into(),
            name: name.into(),
            avatar: "🐱".into(),
            score: 0,
            answers: Answers::default(),
        }
    }
}
