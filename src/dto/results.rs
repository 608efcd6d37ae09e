//! DTO definitions for the results views.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    dto::event::QuestionView,
    services::scoring::{QuestionDistribution, Summary},
};

/// One participant placed on the score spectrum.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpectrumEntry {
    pub id: String,
    pub name: String,
    pub avatar: String,
    pub score: i32,
    /// Position between the lowest and highest reachable score, 0 to 100.
    pub position_percent: f64,
}

/// Everyone's position on the spectrum.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpectrumResponse {
    pub event_id: String,
    pub title: String,
    pub min_score: i32,
    pub max_score: i32,
    /// Where the snapshot came from: `remote`, `cache` or `detached`.
    pub source: String,
    pub entries: Vec<SpectrumEntry>,
}

/// Ordering and filtering of the detailed table and its export.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DetailedQuery {
    /// `score`, `name`, `avatar`, `positive-sum`, `negative-sum` or `question-<index>`.
    pub sort: Option<String>,
    /// `asc` or `desc`.
    pub direction: Option<String>,
    /// Case-insensitive filter on name, avatar and score.
    pub search: Option<String>,
}

/// One row of the detailed table.
#[derive(Debug, Serialize, ToSchema)]
pub struct DetailedRow {
    /// Position in the full ranking, unaffected by the search filter.
    pub rank: usize,
    pub id: String,
    pub name: String,
    pub avatar: String,
    pub score: i32,
    pub positives: i32,
    pub negatives: i32,
    /// Aligned with `questions`: `1` yes, `0` no, `null` unanswered.
    pub answers: Vec<Option<u8>>,
}

/// Yes/no split of one question.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DistributionView {
    pub index: usize,
    pub yes: usize,
    pub no: usize,
    pub yes_percent: Option<u32>,
    pub no_percent: Option<u32>,
}

impl From<QuestionDistribution> for DistributionView {
    fn from(value: QuestionDistribution) -> Self {
        Self {
            index: value.index,
            yes: value.yes,
            no: value.no,
            yes_percent: value.yes_percent,
            no_percent: value.no_percent,
        }
    }
}

/// Headline figures of an event.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SummaryView {
    pub participants: usize,
    pub questions: usize,
    pub average_score: f64,
}

impl From<Summary> for SummaryView {
    fn from(value: Summary) -> Self {
        Self {
            participants: value.participants,
            questions: value.questions,
            average_score: value.average_score,
        }
    }
}

/// The detailed results table.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DetailedResponse {
    pub event_id: String,
    pub title: String,
    pub sort: String,
    pub direction: String,
    pub summary: SummaryView,
    pub questions: Vec<QuestionView>,
    pub rows: Vec<DetailedRow>,
    pub distribution: Vec<DistributionView>,
}
