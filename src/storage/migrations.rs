//! Database migrations for stockflow.
//!
//! Each migration upgrades the schema by one version. Migrations run
//! automatically when the database is opened.

use rusqlite::Connection;

use crate::error::StockflowError;

/// Current schema version.
const CURRENT_VERSION: i32 = 1;

/// Get the current schema version from the database.
///
/// Returns 0 for a new database.
pub fn get_version(conn: &Connection) -> Result<i32, StockflowError> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| StockflowError::StorageUnavailable(format!("Failed to get schema version: {e}")))
}

fn set_version(conn: &Connection, version: i32) -> Result<(), StockflowError> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))
        .map_err(|e| StockflowError::StorageUnavailable(format!("Failed to set schema version: {e}")))
}

/// Run all pending migrations.
///
/// Each migration commits together with its version bump, so an
/// interrupted upgrade leaves the previous schema intact.
pub fn run(conn: &Connection) -> Result<(), StockflowError> {
    let current = get_version(conn)?;

    if current >= CURRENT_VERSION {
        return Ok(());
    }

    for version in (current + 1)..=CURRENT_VERSION {
        let tx = conn.unchecked_transaction().map_err(|e| {
            StockflowError::StorageUnavailable(format!("Failed to start migration: {e}"))
        })?;
        run_migration(&tx, version)?;
        set_version(&tx, version)?;
        tx.commit().map_err(|e| {
            StockflowError::StorageUnavailable(format!("Failed to commit migration v{version}: {e}"))
        })?;
        tracing::debug!(version, "applied schema migration");
    }

    Ok(())
}

fn run_migration(conn: &Connection, version: i32) -> Result<(), StockflowError> {
    match version {
        1 => migrate_v1(conn),
        _ => Err(StockflowError::StorageUnavailable(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: the action queue and the drain lease.
///
/// `seq` fixes enqueue order; `action_id` is the idempotency key sent to
/// the remote inventory. `sync_lease` holds at most one row naming the
/// process currently draining the queue.
fn migrate_v1(conn: &Connection) -> Result<(), StockflowError> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS action_queue (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            action_id TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL,
            payload TEXT NOT NULL,
            enqueued_at TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            last_attempt_at TEXT,
            last_error TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_action_queue_state
        ON action_queue(state);

        CREATE TABLE IF NOT EXISTS sync_lease (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            holder TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        );
        ",
    )
    .map_err(|e| StockflowError::StorageUnavailable(format!("Migration v1 failed: {e}")))
}
