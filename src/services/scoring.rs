//! Pure scoring, distribution and ranking over participant snapshots.

use std::{cmp::Ordering, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    dao::models::{Answer, ParticipantEntity},
    services::questions::EnabledQuestion,
};

/// Weighted sum of the questions answered yes.
pub fn compute_score(participant: &ParticipantEntity, questions: &[EnabledQuestion]) -> i32 {
    questions
        .iter()
        .filter(|q| participant.answers.get(q.index).is_some_and(Answer::is_yes))
        .map(|q| q.value)
        .sum()
}

/// Split of a score into what pushed it up and what pulled it down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContributionSums {
    /// Sum of positive weights answered yes.
    pub positive: i32,
    /// Sum of the magnitudes of non-positive weights answered yes.
    pub negative: i32,
}

pub fn compute_contribution_sums(
    participant: &ParticipantEntity,
    questions: &[EnabledQuestion],
) -> ContributionSums {
    questions
        .iter()
        .filter(|q| participant.answers.get(q.index).is_some_and(Answer::is_yes))
        .fold(ContributionSums::default(), |mut sums, q| {
            if q.value > 0 {
                sums.positive += q.value;
            } else {
                sums.negative += q.value.abs();
            }
            sums
        })
}

/// Yes/no split of one question among the participants who answered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionDistribution {
    pub index: usize,
    pub yes: usize,
    pub no: usize,
    /// `None` when nobody answered.
    pub yes_percent: Option<u32>,
    pub no_percent: Option<u32>,
}

/// Per-question distribution. Percentages are over respondents only.
pub fn compute_distribution(
    questions: &[EnabledQuestion],
    participants: &[ParticipantEntity],
) -> Vec<QuestionDistribution> {
    questions
        .iter()
        .map(|q| {
            let (yes, no) = participants.iter().fold((0, 0), |(yes, no), p| {
                match p.answers.get(q.index) {
                    Some(Answer::Yes) => (yes + 1, no),
                    Some(Answer::No) => (yes, no + 1),
                    None => (yes, no),
                }
            });
            let respondents = yes + no;
            QuestionDistribution {
                index: q.index,
                yes,
                no,
                yes_percent: rounded_percent(yes, respondents),
                no_percent: rounded_percent(no, respondents),
            }
        })
        .collect()
}

fn rounded_percent(count: usize, total: usize) -> Option<u32> {
    if total == 0 {
        return None;
    }
    // Half rounds up.
    Some(((count * 200 + total) / (total * 2)) as u32)
}

/// Column a ranking orders by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Score,
    Name,
    Avatar,
    PositiveSum,
    NegativeSum,
    /// Answer to the question at this catalog index: yes > no > unanswered.
    Question(usize),
}

/// Error returned when parsing an unknown [`SortKey`] or [`SortDirection`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sort option `{0}`")]
pub struct UnknownSortKey(pub String);

impl FromStr for SortKey {
    type Err = UnknownSortKey;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "score" => Ok(SortKey::Score),
            "name" => Ok(SortKey::Name),
            "avatar" => Ok(SortKey::Avatar),
            "positive-sum" => Ok(SortKey::PositiveSum),
            "negative-sum" => Ok(SortKey::NegativeSum),
            other => other
                .strip_prefix("question-")
                .and_then(|index| index.parse().ok())
                .map(SortKey::Question)
                .ok_or_else(|| UnknownSortKey(other.to_owned())),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Score => f.write_str("score"),
            SortKey::Name => f.write_str("name"),
            SortKey::Avatar => f.write_str("avatar"),
            SortKey::PositiveSum => f.write_str("positive-sum"),
            SortKey::NegativeSum => f.write_str("negative-sum"),
            SortKey::Question(index) => write!(f, "question-{index}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = UnknownSortKey;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(UnknownSortKey(other.to_owned())),
        }
    }
}

/// Order participants by `key`. Equal elements keep their input order.
pub fn rank<'a>(
    participants: &'a [ParticipantEntity],
    questions: &[EnabledQuestion],
    key: SortKey,
    direction: SortDirection,
) -> Vec<&'a ParticipantEntity> {
    let mut ranked: Vec<&ParticipantEntity> = participants.iter().collect();
    let compare = |a: &&ParticipantEntity, b: &&ParticipantEntity| -> Ordering {
        match key {
            SortKey::Score => a.score.cmp(&b.score),
            SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortKey::Avatar => a.avatar.to_lowercase().cmp(&b.avatar.to_lowercase()),
            SortKey::PositiveSum => compute_contribution_sums(a, questions)
                .positive
                .cmp(&compute_contribution_sums(b, questions).positive),
            SortKey::NegativeSum => compute_contribution_sums(a, questions)
                .negative
                .cmp(&compute_contribution_sums(b, questions).negative),
            SortKey::Question(index) => {
                Answer::ordinal(a.answers.get(index)).cmp(&Answer::ordinal(b.answers.get(index)))
            }
        }
    };

    match direction {
        SortDirection::Asc => ranked.sort_by(compare),
        SortDirection::Desc => ranked.sort_by(|a, b| compare(b, a)),
    }
    ranked
}

/// Case-insensitive substring match over name, avatar and score.
pub fn matches_search(participant: &ParticipantEntity, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return true;
    }
    participant.name.to_lowercase().contains(&term)
        || participant.avatar.to_lowercase().contains(&term)
        || participant.score.to_string().contains(&term)
}

/// Headline figures of an event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub participants: usize,
    pub questions: usize,
    /// Mean stored score rounded to one decimal, `0.0` without participants.
    pub average_score: f64,
}

pub fn summary(participants: &[ParticipantEntity], questions: &[EnabledQuestion]) -> Summary {
    let average_score = if participants.is_empty() {
        0.0
    } else {
        let total: i64 = participants.iter().map(|p| i64::from(p.score)).sum();
        (total as f64 / participants.len() as f64 * 10.0).round() / 10.0
    };

    Summary {
        participants: participants.len(),
        questions: questions.len(),
        average_score,
    }
}
