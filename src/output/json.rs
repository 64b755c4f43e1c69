//! JSON output formatting for stockflow.

use serde::Serialize;
use serde_json::json;

use crate::error::StockflowError;
use crate::sync::{ActionSummary, QueueStats, Submission, SyncReport};

/// Format queued actions as JSON
///
/// # Errors
///
/// Returns `StockflowError::Parse` if JSON serialization fails.
pub fn format_summaries_json(summaries: &[ActionSummary]) -> Result<String, StockflowError> {
    let output = json!({
        "count": summaries.len(),
        "items": summaries
    });
    to_json(&output)
}

/// Format a sync report as JSON, including the operator notices
///
/// # Errors
///
/// Returns `StockflowError::Parse` if JSON serialization fails.
pub fn format_report_json(report: &SyncReport) -> Result<String, StockflowError> {
    let mut output = serde_json::to_value(report)?;
    if let Some(map) = output.as_object_mut() {
        map.insert("notices".to_string(), serde_json::to_value(report.notices())?);
    }
    to_json(&output)
}

/// Format queue statistics as JSON
///
/// # Errors
///
/// Returns `StockflowError::Parse` if JSON serialization fails.
pub fn format_stats_json(stats: &QueueStats, reconciling: bool) -> Result<String, StockflowError> {
    let output = json!({
        "pending": stats.pending,
        "applying": stats.applying,
        "failed": stats.failed,
        "total": stats.total(),
        "oldest_enqueued_at": stats.oldest_enqueued_at.map(|t| t.to_rfc3339()),
        "reconciling": reconciling,
    });
    to_json(&output)
}

/// Format a submission result as JSON
///
/// # Errors
///
/// Returns `StockflowError::Parse` if JSON serialization fails.
pub fn format_submission_json(submission: &Submission) -> Result<String, StockflowError> {
    to_json(submission)
}

/// Serialize any value as pretty JSON
///
/// # Errors
///
/// Returns `StockflowError::Parse` if JSON serialization fails.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, StockflowError> {
    Ok(serde_json::to_string_pretty(value)?)
}
