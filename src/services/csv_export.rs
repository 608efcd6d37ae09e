//! Detailed results as a CSV download.

use time::{Date, OffsetDateTime};

use crate::{
    dao::models::{Answer, EventEntity},
    services::{
        questions::EnabledQuestion,
        scoring::{SortDirection, SortKey, compute_contribution_sums, matches_search, rank},
    },
};

const FALLBACK_TITLE: &str = "Event";

/// A rendered export, ready to be served as an attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExport {
    pub filename: String,
    pub content: String,
}

/// Render the participant table in rank order.
///
/// `#` is the position in the full ranking, so rows keep their number when a
/// search hides others.
pub fn export_csv(
    event: &EventEntity,
    questions: &[EnabledQuestion],
    key: SortKey,
    direction: SortDirection,
    search: Option<&str>,
    today: Date,
) -> CsvExport {
    let mut header: Vec<String> = ["#", "Avatar", "Name", "Score", "Positives", "Negatives"]
        .into_iter()
        .map(str::to_owned)
        .collect();
    header.extend(questions.iter().map(question_header));

    let mut rows = vec![header];
    for (position, participant) in rank(&event.participants, questions, key, direction)
        .into_iter()
        .enumerate()
    {
        if search.is_some_and(|term| !matches_search(participant, term)) {
            continue;
        }

        let sums = compute_contribution_sums(participant, questions);
        let mut row = vec![
            (position + 1).to_string(),
            participant.avatar.clone(),
            participant.name.clone(),
            participant.score.to_string(),
            sums.positive.to_string(),
            sums.negative.to_string(),
        ];
        row.extend(questions.iter().map(|q| match participant.answers.get(q.index) {
            Some(Answer::Yes) => q.value.to_string(),
            Some(Answer::No) => "0".to_owned(),
            None => String::new(),
        }));
        rows.push(row);
    }

    let content = rows
        .iter()
        .map(|row| row.iter().map(|cell| escape(cell)).collect::<Vec<_>>().join(","))
        .collect::<Vec<_>>()
        .join("\n");

    CsvExport {
        filename: export_filename(&event.title, today),
        content,
    }
}

/// Export for today's UTC date.
pub fn export_csv_now(
    event: &EventEntity,
    questions: &[EnabledQuestion],
    key: SortKey,
    direction: SortDirection,
    search: Option<&str>,
) -> CsvExport {
    export_csv(event, questions, key, direction, search, OffsetDateTime::now_utc().date())
}

fn question_header(question: &EnabledQuestion) -> String {
    let sign = if question.value > 0 { "+" } else { "" };
    format!("Q{} ({sign}{})", question.index + 1, question.value)
}

fn escape(cell: &str) -> String {
    if cell.contains([',', '"', '\n']) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_owned()
    }
}

/// `<title>-detailed-results-<YYYY-MM-DD>.csv`
pub fn export_filename(title: &str, date: Date) -> String {
    let title = if title.is_empty() { FALLBACK_TITLE } else { title };
    format!(
        "{title}-detailed-results-{:04}-{:02}-{:02}.csv",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}
