//! Queue management commands.

use serde_json::json;

use crate::cli::args::{OutputFormat, QueueCommands};
use crate::error::StockflowError;
use crate::output::{format_report, format_stats, format_summaries, to_json};
use crate::sync::{ActionId, ActionState, QueueInspector};

use super::App;

/// Execute queue subcommands.
///
/// # Errors
///
/// Returns an error if the queue cannot be read or written, or if a sync is
/// already running.
pub async fn queue(
    app: &App,
    cmd: QueueCommands,
    format: OutputFormat,
) -> Result<String, StockflowError> {
    let inspector = app.inspector();

    match cmd {
        QueueCommands::Status => format_stats(
            &inspector.stats()?,
            app.coordinator.is_reconciling(),
            format,
        ),
        QueueCommands::List { state } => list_actions(&inspector, state, format),
        QueueCommands::Sync => {
            let report = inspector.force_sync().await?;
            format_report(&report, format)
        },
        QueueCommands::Purge { force } => purge(&inspector, force, format),
        QueueCommands::Retry { id, all } => retry(&inspector, id, all, format),
    }
}

fn list_actions(
    inspector: &QueueInspector,
    state: Option<ActionState>,
    format: OutputFormat,
) -> Result<String, StockflowError> {
    let mut summaries = inspector.peek()?;
    if let Some(state) = state {
        summaries.retain(|s| s.state == state);
    }
    format_summaries(&summaries, format)
}

fn purge(
    inspector: &QueueInspector,
    force: bool,
    format: OutputFormat,
) -> Result<String, StockflowError> {
    if !force {
        return Err(StockflowError::Usage(
            "Purging deletes unsynced sales and restocks; use --force to confirm".to_string(),
        ));
    }
    let removed = inspector.purge()?;

    match format {
        OutputFormat::Json => to_json(&json!({ "purged": removed })),
        OutputFormat::Pretty => Ok(format!("Purged {removed} queued actions")),
    }
}

fn retry(
    inspector: &QueueInspector,
    id: Option<ActionId>,
    all: bool,
    format: OutputFormat,
) -> Result<String, StockflowError> {
    if let Some(id) = id {
        inspector.retry(&id)?;
        match format {
            OutputFormat::Json => to_json(&json!({ "requeued": [id] })),
            OutputFormat::Pretty => Ok(format!("Requeued action {id}")),
        }
    } else if all {
        let count = inspector.retry_all_failed()?;
        match format {
            OutputFormat::Json => to_json(&json!({ "requeued": count })),
            OutputFormat::Pretty => Ok(format!("Requeued {count} failed actions")),
        }
    } else {
        Err(StockflowError::Usage(
            "Specify --all or provide an action id".to_string(),
        ))
    }
}
