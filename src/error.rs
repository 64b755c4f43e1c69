//! Error types for stockflow.

use thiserror::Error;

use crate::remote::RemoteError;

/// Errors surfaced by the queue, the reconciliation layer and the CLI.
#[derive(Debug, Error)]
pub enum StockflowError {
    /// The local durable store cannot be read or written.
    ///
    /// Callers must reject the originating action rather than drop it.
    #[error("Cannot queue offline action: storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The action failed validation and was not stored.
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// A queued action or other item was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A reconciliation pass is already running.
    #[error("A sync is already in progress")]
    SyncInProgress,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A command was invoked without the arguments it needs.
    #[error("{0}")]
    Usage(String),

    /// Failed to parse or serialize data.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Remote inventory error outside of a reconciliation pass.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StockflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<rusqlite::Error> for StockflowError {
    fn from(err: rusqlite::Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

impl StockflowError {
    /// Process exit code for the CLI.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidAction(_) | Self::Config(_) | Self::Usage(_) | Self::Parse(_) => 2,
            Self::StorageUnavailable(_) | Self::Io(_) => 3,
            Self::NotFound(_) => 4,
            Self::SyncInProgress | Self::Remote(_) => 5,
        }
    }
}
