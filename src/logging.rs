//! Logging setup.
//!
//! Logs go to stderr so command output on stdout stays parseable.
//! `RUST_LOG` takes precedence over the configured level.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::StockflowError;

/// Filter directive for a `-v` count, falling back to the configured level.
#[must_use]
pub fn level_for(config: &LoggingConfig, verbose: u8) -> String {
    match verbose {
        0 => config.level.clone(),
        1 => "stockflow=info".to_string(),
        2 => "stockflow=debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns `Config` if the level is not a valid filter directive or a
/// subscriber is already installed.
pub fn init(config: &LoggingConfig, verbose: u8) -> Result<(), StockflowError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level_for(config, verbose)).map_err(|e| {
            StockflowError::Config(format!("Invalid log level '{}': {e}", config.level))
        })?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    result.map_err(|e| StockflowError::Config(format!("Failed to initialise logging: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_verbosity() {
        let config = LoggingConfig::default();
        assert_eq!(level_for(&config, 0), config.level);
        assert_eq!(level_for(&config, 1), "stockflow=info");
        assert_eq!(level_for(&config, 2), "stockflow=debug");
        assert_eq!(level_for(&config, 5), "trace");
    }
}
