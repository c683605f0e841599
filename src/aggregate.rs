//! Result aggregation: per-page outcomes → one ordered, summarised result.
//!
//! [`aggregate`] does no I/O and reads no clock: the caller passes the
//! timestamps in, so the same inputs always give the same output.

use crate::output::{AggregatedResult, DocumentMetadata, JobSummary, PageOutcome};
use chrono::{DateTime, Utc};
use tracing::info;

/// Longest prompt snippet kept in the summary, in characters.
pub const PROMPT_SNIPPET_LIMIT: usize = 200;

/// Wall-clock points of a job that the summary reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTiming {
    pub started_at: DateTime<Utc>,
    pub aggregation_started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobTiming {
    /// Timing for a job that started at `started_at` and is being aggregated now.
    pub fn ending_now(started_at: DateTime<Utc>, aggregation_started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            aggregation_started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Merge `outcomes` into an [`AggregatedResult`].
///
/// Outcomes may arrive in any order; the result lists them by ascending page
/// number. Mock successes count as successes.
pub fn aggregate(
    job_id: &str,
    document_name: &str,
    mut outcomes: Vec<PageOutcome>,
    metadata: DocumentMetadata,
    prompt: &str,
    timing: JobTiming,
) -> AggregatedResult {
    outcomes.sort_by_key(|o| o.page_number);

    let processed = outcomes.len();
    let successful = outcomes.iter().filter(|o| o.status.is_success()).count();
    let mock = outcomes.iter().filter(|o| o.status.is_mock()).count();
    let errors = processed - successful;

    let source_total_pages = metadata
        .page_count()
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(processed);

    let summary = JobSummary {
        document_name: document_name.to_string(),
        source_total_pages,
        processed_pages_count: processed,
        successful_pages_count: successful,
        mock_pages_count: mock,
        pages_with_errors_count: errors,
        processing_prompt_used_snippet: prompt_snippet(prompt),
        aggregation_timestamp: timing.finished_at,
        total_processing_time_seconds: seconds_between(timing.started_at, timing.finished_at, 2),
        aggregation_time_seconds: seconds_between(
            timing.aggregation_started_at,
            timing.finished_at,
            3,
        ),
        pdf_metadata: metadata,
    };

    info!(
        job_id,
        "Aggregated {}/{} pages ({} successful, {} mock, {} errors)",
        processed,
        source_total_pages,
        successful,
        mock,
        errors
    );

    AggregatedResult {
        job_id: job_id.to_string(),
        processing_summary: summary,
        pages: outcomes,
    }
}

/// The prompt, cut to at most [`PROMPT_SNIPPET_LIMIT`] characters with a
/// trailing `...` when it was longer.
pub fn prompt_snippet(prompt: &str) -> String {
    if prompt.chars().count() <= PROMPT_SNIPPET_LIMIT {
        return prompt.to_string();
    }
    let head: String = prompt.chars().take(PROMPT_SNIPPET_LIMIT - 3).collect();
    format!("{head}...")
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>, decimals: i32) -> f64 {
    let secs = (to - from).num_milliseconds().max(0) as f64 / 1000.0;
    let scale = 10f64.powi(decimals);
    (secs * scale).round() / scale
}
