//! DTO definitions for event creation and participant entry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{Answer, ParticipantEntity},
    dto::validation::{validate_not_blank, validate_pin},
    services::questions::EnabledQuestion,
};

/// Payload describing a new event.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    #[validate(custom(function = "validate_not_blank"), length(max = 120))]
    pub title: String,
    /// Catalog indices switched off for this event. Defaults to the device preference.
    pub disabled_questions: Option<Vec<usize>>,
}

/// Identifiers an organizer shares with participants.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventResponse {
    pub id: String,
    pub title: String,
    pub pin: String,
    /// Link participants open to answer.
    pub url: String,
    pub disabled_questions: Vec<usize>,
    pub created_at: String,
    /// Whether the event reached the remote store, or only the local cache.
    pub stored_remotely: bool,
}

/// One question as presented to participants.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionView {
    /// Catalog index; answers are recorded against it.
    pub index: usize,
    pub text: String,
    pub value: i32,
}

impl From<&EnabledQuestion> for QuestionView {
    fn from(question: &EnabledQuestion) -> Self {
        Self {
            index: question.index,
            text: question.text.clone(),
            value: question.value,
        }
    }
}

/// Public part of an event shown before the PIN prompt.
#[derive(Debug, Serialize, ToSchema)]
pub struct EventEntryView {
    pub id: String,
    pub title: String,
    pub questions: Vec<QuestionView>,
}

/// Request to enter an event.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct JoinRequest {
    /// Required unless this device already joined the event.
    #[validate(custom(function = "validate_pin"))]
    pub pin: Option<String>,
}

/// A participant as seen by clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParticipantView {
    pub id: String,
    pub name: String,
    pub avatar: String,
    pub score: i32,
    /// Question index to `1` (yes) or `0` (no); unanswered questions are absent.
    pub answers: BTreeMap<String, u8>,
}

impl From<&ParticipantEntity> for ParticipantView {
    fn from(participant: &ParticipantEntity) -> Self {
        Self {
            id: participant.id.clone(),
            name: participant.name.clone(),
            avatar: participant.avatar.clone(),
            score: participant.score,
            answers: participant
                .answers
                .iter()
                .map(|(index, answer)| (index.to_string(), answer.as_flag()))
                .collect(),
        }
    }
}

/// Outcome of a successful entry.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub event_id: String,
    pub title: String,
    /// Device the participant is bound to; clients send it back as `X-Device-Id`.
    pub device_id: String,
    /// True when the device's earlier participant was restored.
    pub returning: bool,
    pub participant: ParticipantView,
    pub questions: Vec<QuestionView>,
    pub progress: Progress,
}

/// Yes/no choice for one question.
#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AnswerChoice {
    Yes,
    No,
}

impl From<AnswerChoice> for Answer {
    fn from(choice: AnswerChoice) -> Self {
        match choice {
            AnswerChoice::Yes => Answer::Yes,
            AnswerChoice::No => Answer::No,
        }
    }
}

/// Request recording one answer.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AnswerRequest {
    pub answer: AnswerChoice,
}

/// How far a participant got through the enabled questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Progress {
    pub answered: usize,
    pub total: usize,
}

/// Participant state after an edit.
#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantUpdateResponse {
    pub participant: ParticipantView,
    pub progress: Progress,
}

/// Display changes requested by a participant.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdateParticipantRequest {
    #[validate(custom(function = "validate_not_blank"), length(max = 40))]
    pub name: Option<String>,
    #[validate(custom(function = "validate_not_blank"), length(max = 16))]
    pub avatar: Option<String>,
}
