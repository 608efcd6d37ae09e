//! Read-only projections of an event's results.

use crate::{
    dao::models::EventEntity,
    dto::{
        event::QuestionView,
        results::{
            DetailedQuery, DetailedResponse, DetailedRow, DistributionView, SpectrumEntry,
            SpectrumResponse,
        },
    },
    error::ServiceError,
    services::{
        csv_export::{CsvExport, export_csv_now},
        questions::EnabledQuestion,
        scoring::{
            SortDirection, SortKey, compute_contribution_sums, compute_distribution,
            matches_search, rank, summary,
        },
        sync_engine::{OpenOptions, SyncSession},
    },
    state::{SharedState, session::SessionPhase},
};

/// Everyone's position between the lowest and highest reachable score.
pub async fn spectrum(state: &SharedState, event_id: &str) -> Result<SpectrumResponse, ServiceError> {
    let session = SyncSession::open(state.session_context().await, event_id, OpenOptions::default()).await;
    let event = session.require_snapshot()?;
    let source = match session.phase() {
        SessionPhase::Ready(source) => source.as_str(),
        _ => "unknown",
    };
    let questions = state.questions().enabled_for(&event);
    let (min_score, max_score) = score_bounds(&questions);

    let entries = rank(&event.participants, &questions, SortKey::Score, SortDirection::Desc)
        .into_iter()
        .map(|participant| SpectrumEntry {
            id: participant.id.clone(),
            name: participant.name.clone(),
            avatar: participant.avatar.clone(),
            score: participant.score,
            position_percent: position_percent(participant.score, min_score, max_score),
        })
        .collect();

    Ok(SpectrumResponse {
        event_id: event.id,
        title: event.title,
        min_score,
        max_score,
        source: source.to_owned(),
        entries,
    })
}

/// The sortable, searchable participant table with per-question statistics.
pub async fn detailed(
    state: &SharedState,
    event_id: &str,
    query: DetailedQuery,
) -> Result<DetailedResponse, ServiceError> {
    let (key, direction) = parse_order(&query)?;
    let event = load(state, event_id).await?;
    let questions = state.questions().enabled_for(&event);
    let search = query.search.as_deref();

    let rows = rank(&event.participants, &questions, key, direction)
        .into_iter()
        .enumerate()
        .filter(|(_, participant)| search.is_none_or(|term| matches_search(participant, term)))
        .map(|(position, participant)| {
            let sums = compute_contribution_sums(participant, &questions);
            DetailedRow {
                rank: position + 1,
                id: participant.id.clone(),
                name: participant.name.clone(),
                avatar: participant.avatar.clone(),
                score: participant.score,
                positives: sums.positive,
                negatives: sums.negative,
                answers: questions
                    .iter()
                    .map(|q| participant.answers.get(q.index).map(|answer| answer.as_flag()))
                    .collect(),
            }
        })
        .collect();

    Ok(DetailedResponse {
        summary: summary(&event.participants, &questions).into(),
        distribution: compute_distribution(&questions, &event.participants)
            .into_iter()
            .map(DistributionView::from)
            .collect(),
        questions: questions.iter().map(QuestionView::from).collect(),
        rows,
        sort: key.to_string(),
        direction: direction.as_str().to_owned(),
        event_id: event.id,
        title: event.title,
    })
}

/// The detailed table as CSV, in the same order and with the same filter.
pub async fn export(
    state: &SharedState,
    event_id: &str,
    query: DetailedQuery,
) -> Result<CsvExport, ServiceError> {
    let (key, direction) = parse_order(&query)?;
    let event = load(state, event_id).await?;
    let questions = state.questions().enabled_for(&event);
    Ok(export_csv_now(&event, &questions, key, direction, query.search.as_deref()))
}

async fn load(state: &SharedState, event_id: &str) -> Result<EventEntity, ServiceError> {
    let session = SyncSession::open(state.session_context().await, event_id, OpenOptions::default()).await;
    Ok(session.require_snapshot()?)
}

fn parse_order(query: &DetailedQuery) -> Result<(SortKey, SortDirection), ServiceError> {
    let key = match query.sort.as_deref() {
        Some(raw) => raw
            .parse::<SortKey>()
            .map_err(|err| ServiceError::InvalidInput(err.to_string()))?,
        None => SortKey::default(),
    };
    let direction = match query.direction.as_deref() {
        Some(raw) => raw
            .parse::<SortDirection>()
            .map_err(|err| ServiceError::InvalidInput(err.to_string()))?,
        None => SortDirection::default(),
    };
    Ok((key, direction))
}

/// Lowest and highest score reachable with `questions`.
fn score_bounds(questions: &[EnabledQuestion]) -> (i32, i32) {
    questions.iter().fold((0, 0), |(min, max), q| {
        if q.value > 0 {
            (min, max + q.value)
        } else {
            (min + q.value, max)
        }
    })
}

fn position_percent(score: i32, min: i32, max: i32) -> f64 {
    if max <= min {
        return 50.0;
    }
    let ratio = f64::from(score - min) / f64::from(max - min);
    (ratio * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(index: usize, value: i32) -> EnabledQuestion {
        EnabledQuestion {
            index,
            text: String::new(),
            value,
        }
    }

    #[test]
    fn bounds_split_weights_by_sign() {
        let questions = [question(0, 3), question(1, -2), question(2, 0), question(3, 1)];
        assert_eq!(score_bounds(&questions), (-2, 4));
    }

    #[test]
    fn position_is_clamped_and_centered_on_flat_range() {
        assert_eq!(position_percent(-2, -2, 4), 0.0);
        assert_eq!(position_percent(4, -2, 4), 100.0);
        assert_eq!(position_percent(1, -2, 4), 50.0);
        assert_eq!(position_percent(9, -2, 4), 100.0);
        assert_eq!(position_percent(0, 0, 0), 50.0);
    }

    #[test]
    fn order_defaults_to_score_descending() {
        assert_eq!(
            parse_order(&DetailedQuery::default()).unwrap(),
            (SortKey::Score, SortDirection::Desc)
        );
        let query = DetailedQuery {
            sort: Some("question-3".into()),
            direction: Some("asc".into()),
            search: None,
        };
        assert_eq!(parse_order(&query).unwrap(), (SortKey::Question(3), SortDirection::Asc));
        let bad = DetailedQuery {
            sort: Some("colour".into()),
            ..DetailedQuery::default()
        };
        assert!(matches!(parse_order(&bad), Err(ServiceError::InvalidInput(_))));
    }
}
