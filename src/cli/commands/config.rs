//! Config inspection commands.

use crate::cli::args::{ConfigCommands, OutputFormat};
use crate::config::{Config, Paths};
use crate::error::StockflowError;
use crate::output::to_json;

const REDACTED: &str = "********";

/// Execute config subcommands.
///
/// # Errors
///
/// Returns an error if the configuration cannot be serialized.
pub fn config(
    paths: &Paths,
    config: &Config,
    cmd: ConfigCommands,
    format: OutputFormat,
) -> Result<String, StockflowError> {
    match cmd {
        ConfigCommands::Show => {
            let mut shown = config.clone();
            if shown.remote.api_key.is_some() {
                shown.remote.api_key = Some(REDACTED.to_string());
            }
            match format {
                OutputFormat::Json => to_json(&shown),
                OutputFormat::Pretty => serde_yaml::to_string(&shown)
                    .map(|yaml| yaml.trim_end().to_string())
                    .map_err(|e| StockflowError::Config(format!("Failed to serialize config: {e}"))),
            }
        },
        ConfigCommands::Path => match format {
            OutputFormat::Json => to_json(&serde_json::json!({
                "config_file": paths.config_file,
                "database": paths.database,
            })),
            OutputFormat::Pretty => Ok(paths.config_file.display().to_string()),
        },
    }
}
