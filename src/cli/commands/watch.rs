//! Long-running sync loop.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::args::OutputFormat;
use crate::error::StockflowError;
use crate::output::format_report;

use super::App;

/// Probe the inventory and sync on every reconnect until Ctrl-C.
///
/// Reports are printed as they arrive.
///
/// # Errors
///
/// Returns an error if the signal handler cannot be installed or a report
/// cannot be formatted.
pub async fn watch(app: &App, format: OutputFormat) -> Result<String, StockflowError> {
    let cancel = CancellationToken::new();
    let mut reports = app.coordinator.subscribe();

    let sync_task = Arc::clone(&app.coordinator).spawn(app.connectivity.subscribe(), cancel.clone());
    let probe_task = app.spawn_probe(cancel.clone());
    info!(
        interval_secs = app.config.sync.probe_interval_secs,
        "watching for connectivity changes"
    );

    let result = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => break signal.map_err(StockflowError::from),
            report = reports.recv() => match report {
                Ok(report) => match format_report(&report, format) {
                    Ok(output) => println!("{output}"),
                    Err(e) => break Err(e),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed sync reports"),
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    cancel.cancel();
    for task in [sync_task, probe_task] {
        if let Err(e) = task.await {
            warn!(error = %e, "background task ended abnormally");
        }
    }

    result.map(|()| "Stopped watching".to_string())
}
