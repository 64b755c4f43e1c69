//! `SQLite` database connection.
//!
//! The database lives at `~/.stockflow/queue.db` (or under `$STOCKFLOW_HOME`)
//! and holds the durable offline action queue.

use std::path::Path;

use rusqlite::Connection;

use crate::error::StockflowError;

use super::migrations;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at a specific path.
    ///
    /// Creates the file and runs migrations if necessary. The journal is put
    /// in WAL mode with `synchronous = FULL`, so a committed write survives
    /// an immediate crash.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self, StockflowError> {
        let conn = Connection::open(path).map_err(|e| {
            StockflowError::StorageUnavailable(format!(
                "Failed to open database {}: {e}",
                path.display()
            ))
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| StockflowError::StorageUnavailable(format!("Failed to set pragmas: {e}")))?;

        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the database cannot be opened or migrated.
    pub fn open_in_memory() -> Result<Self, StockflowError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StockflowError::StorageUnavailable(format!("Failed to open in-memory database: {e}"))
        })?;

        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), StockflowError> {
        migrations::run(&self.conn)
    }

    /// Get the current schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the version cannot be read.
    pub fn schema_version(&self) -> Result<i32, StockflowError> {
        migrations::get_version(&self.conn)
    }

    /// Get a reference to the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
