//! Output formatting for stockflow.
//!
//! This module renders queue contents, sync reports and submissions as
//! colored text or JSON.

mod json;
mod pretty;

use crate::cli::args::OutputFormat;
use crate::error::StockflowError;
use crate::sync::{ActionSummary, QueueStats, Submission, SyncReport};

pub use json::*;
pub use pretty::*;

/// Format queued actions based on output format
///
/// # Errors
///
/// Returns `StockflowError::Parse` if JSON serialization fails.
pub fn format_summaries(
    summaries: &[ActionSummary],
    format: OutputFormat,
) -> Result<String, StockflowError> {
    match format {
        OutputFormat::Pretty => Ok(format_summaries_pretty(summaries)),
        OutputFormat::Json => format_summaries_json(summaries),
    }
}

/// Format a sync report based on output format
///
/// # Errors
///
/// Returns `StockflowError::Parse` if JSON serialization fails.
pub fn format_report(report: &SyncReport, format: OutputFormat) -> Result<String, StockflowError> {
    match format {
        OutputFormat::Pretty => Ok(format_report_pretty(report)),
        OutputFormat::Json => format_report_json(report),
    }
}

/// Format queue statistics based on output format
///
/// # Errors
///
/// Returns `StockflowError::Parse` if JSON serialization fails.
pub fn format_stats(
    stats: &QueueStats,
    reconciling: bool,
    format: OutputFormat,
) -> Result<String, StockflowError> {
    match format {
        OutputFormat::Pretty => Ok(format_stats_pretty(stats, reconciling)),
        OutputFormat::Json => format_stats_json(stats, reconciling),
    }
}

/// Format a submission based on output format
///
/// # Errors
///
/// Returns `StockflowError::Parse` if JSON serialization fails.
pub fn format_submission(
    submission: &Submission,
    description: &str,
    format: OutputFormat,
) -> Result<String, StockflowError> {
    match format {
        OutputFormat::Pretty => Ok(format_submission_pretty(submission, description)),
        OutputFormat::Json => format_submission_json(submission),
    }
}
