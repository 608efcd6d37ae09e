//! Question catalog and per-event enabled-set resolution.

use std::{collections::BTreeSet, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::dao::models::{EventEntity, ParticipantEntity};

/// One yes/no statement with its signed weight on the spectrum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub value: i32,
}

/// A question that counts for a given event, tagged with its catalog index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnabledQuestion {
    /// Position in the full catalog; answers are keyed by it.
    pub index: usize,
    pub text: String,
    pub value: i32,
}

/// Immutable, cheaply clonable list of every question an event may use.
#[derive(Debug, Clone)]
pub struct QuestionCatalog {
    questions: Arc<[Question]>,
}

impl QuestionCatalog {
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            questions: questions.into(),
        }
    }

    /// Catalog shipped with the binary, used when none is configured.
    pub fn builtin() -> Self {
        const DEFAULTS: &[(&str, i32)] = &[
            ("I have never had to skip a meal because money was tight.", 2),
            ("I grew up with more than fifty books at home.", 1),
            ("A parent or guardian of mine attended university.", 2),
            ("I have been followed or closely watched in a shop.", -2),
            ("I can speak my first language at work without second thoughts.", 1),
            ("I have had to work to pay for my own studies.", -1),
            ("I have been the only person like me in a room of colleagues.", -1),
            ("I can take time off when I am ill without worrying about my job.", 2),
            ("I have been judged by my accent.", -1),
            ("I have moved country without choosing to.", -3),
            ("I can find plasters matching my skin tone in most shops.", 1),
            ("I have had a job interview where my name was mispronounced.", -1),
        ];

        Self::new(
            DEFAULTS
                .iter()
                .map(|(text, value)| Question {
                    text: (*text).to_owned(),
                    value: *value,
                })
                .collect(),
        )
    }

    pub fn all(&self) -> &[Question] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    /// Questions not listed in `disabled`, in catalog order.
    pub fn enabled(&self, disabled: &BTreeSet<usize>) -> Vec<EnabledQuestion> {
        self.questions
            .iter()
            .enumerate()
            .filter(|(index, _)| !disabled.contains(index))
            .map(|(index, question)| EnabledQuestion {
                index,
                text: question.text.clone(),
                value: question.value,
            })
            .collect()
    }

    /// Enabled questions of `event`, inferring the disabled set on legacy events.
    pub fn enabled_for(&self, event: &EventEntity) -> Vec<EnabledQuestion> {
        self.enabled(&resolve_disabled(event, self.len()))
    }
}

/// Disabled question set of `event`.
///
/// Events created before the set was stored get it inferred from the
/// answers. A question nobody answered yet is then reported as disabled.
pub fn resolve_disabled(event: &EventEntity, catalog_len: usize) -> BTreeSet<usize> {
    match &event.disabled_questions {
        Some(disabled) => disabled.clone(),
        None => infer_disabled(&event.participants, catalog_len),
    }
}

/// Every catalog index no participant answered. Empty when nobody joined.
pub fn infer_disabled(participants: &[ParticipantEntity], catalog_len: usize) -> BTreeSet<usize> {
    if participants.is_empty() {
        return BTreeSet::new();
    }

    let answered: BTreeSet<usize> = participants
        .iter()
        .flat_map(|p| p.answers.answered_indices())
        .collect();
    (0..catalog_len).filter(|index| !answered.contains(index)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{answers::Answers, models::Answer};

    fn catalog(len: usize) -> QuestionCatalog {
        QuestionCatalog::new(
            (0..len)
                .map(|i| Question {
                    text: format!("Q{i}"),
                    value: i as i32 - 3,
                })
                .collect(),
        )
    }

    #[test]
    fn disabled_indices_are_skipped_in_order() {
        let enabled = catalog(8).enabled(&BTreeSet::from([2, 5]));
        let indices: Vec<_> = enabled.iter().map(|q| q.index).collect();
        assert_eq!(indices, [0, 1, 3, 4, 6, 7]);
        assert_eq!(enabled[2].text, "Q3");
    }

    #[test]
    fn legacy_event_infers_unanswered_as_disabled() {
        let mut event = EventEntity::new("e".into(), "T".into(), "123456".into(), BTreeSet::new());
        event.disabled_questions = None;
        assert!(resolve_disabled(&event, 4).is_empty());

        event.participants.push(ParticipantEntity {
            id: "a".into(),
            name: "A".into(),
            avatar: "🐱".into(),
            score: 0,
            answers: [(0, Answer::Yes), (2, Answer::No)].into_iter().collect::<Answers>(),
        });
        assert_eq!(resolve_disabled(&event, 4), BTreeSet::from([1, 3]));
    }

    #[test]
    fn stored_set_wins_over_inference() {
        let mut event = EventEntity::new("e".into(), "T".into(), "123456".into(), BTreeSet::from([1]));
        event.participants.push(ParticipantEntity {
            id: "a".into(),
            name: "A".into(),
            avatar: "🐱".into(),
            score: 0,
            answers: Answers::default(),
        });
        assert_eq!(resolve_disabled(&event, 4), BTreeSet::from([1]));
    }

    #[test]
    fn builtin_catalog_is_not_empty() {
        assert!(!QuestionCatalog::builtin().is_empty());
    }
}
