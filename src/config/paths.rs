//! Path resolution for stockflow configuration and data files.
//!
//! All data lives in `~/.stockflow/` unless `$STOCKFLOW_HOME` points elsewhere:
//! - `config.yaml` - settings
//! - `queue.db` - `SQLite` database holding the offline action queue

use std::path::PathBuf;

use crate::error::StockflowError;

/// Environment variable overriding the data directory.
pub const HOME_ENV: &str = "STOCKFLOW_HOME";

/// Paths to stockflow configuration and data files.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root directory: `~/.stockflow/`
    pub root: PathBuf,
    /// Config file: `~/.stockflow/config.yaml`
    pub config_file: PathBuf,
    /// Database file: `~/.stockflow/queue.db`
    pub database: PathBuf,
}

impl Paths {
    /// Resolve paths from `$STOCKFLOW_HOME`, falling back to `$HOME/.stockflow`.
    ///
    /// # Errors
    ///
    /// Returns an error if neither variable is set.
    pub fn new() -> Result<Self, StockflowError> {
        if let Some(root) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::with_root(PathBuf::from(root)));
        }

        let home = std::env::var("HOME").map_err(|_| {
            StockflowError::Config("Could not determine home directory".to_string())
        })?;

        Ok(Self::with_root(PathBuf::from(home).join(".stockflow")))
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.yaml"),
            database: root.join("queue.db"),
            root,
        }
    }

    /// Ensure the root directory exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the directory cannot be created, since
    /// the queue cannot be persisted without it.
    pub fn ensure_dirs(&self) -> Result<(), StockflowError> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root).map_err(|e| {
                StockflowError::StorageUnavailable(format!(
                    "Failed to create directory {}: {e}",
                    self.root.display()
                ))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_with_root() {
        let root = PathBuf::from("/tmp/test-stockflow");
        let paths = Paths::with_root(root.clone());

        assert_eq!(paths.root, root);
        assert_eq!(paths.config_file, root.join("config.yaml"));
        assert_eq!(paths.database, root.join("queue.db"));
    }

    #[test]
    fn test_ensure_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::with_root(temp_dir.path().join("nested").join("home"));

        paths.ensure_dirs().unwrap();
        assert!(paths.root.exists());
    }
}
