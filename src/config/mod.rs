//! Configuration management for stockflow.
//!
//! Loads settings from `~/.stockflow/config.yaml` (or `$STOCKFLOW_HOME`).

mod paths;
mod settings;

pub use paths::{Paths, HOME_ENV};
pub use settings::{ColorSetting, Config, GeneralConfig, LoggingConfig, RemoteConfig, SyncConfig};
