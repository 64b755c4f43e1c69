//! Durable queue store.
//!
//! Persists queued actions in `SQLite` in enqueue order. Every write is a
//! single committed statement, so it is durable once the call returns.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, ErrorCode, OptionalExtension, Row};
use serde::Serialize;

use super::action::{ActionId, ActionKind, ActionPayload, ActionState, QueuedAction};
use crate::error::StockflowError;
use crate::storage::Database;

const SELECT_COLUMNS: &str = "SELECT action_id, kind, payload, enqueued_at, state, attempts,
        last_attempt_at, last_error
     FROM action_queue";

/// Ordered, persistent collection of queued actions.
pub struct ActionQueue {
    db: Mutex<Database>,
}

impl ActionQueue {
    /// Open the queue in the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the database cannot be opened.
    pub fn open_at(path: &Path) -> Result<Self, StockflowError> {
        Ok(Self::with_database(Database::open_at(path)?))
    }

    /// Create a queue over an existing database connection.
    #[must_use]
    pub const fn with_database(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>, StockflowError> {
        self.db
            .lock()
            .map_err(|_| StockflowError::StorageUnavailable("queue lock poisoned".to_string()))
    }

    /// Persist a new action at the tail of the queue.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAction` if the payload is invalid, the action is not
    /// pending or its id is already queued; `StorageUnavailable` if the
    /// write fails.
    pub fn append(&self, action: &QueuedAction) -> Result<(), StockflowError> {
        action.payload.validate()?;
        if action.state != ActionState::Pending {
            return Err(StockflowError::InvalidAction(format!(
                "Only pending actions can be queued (got {})",
                action.state
            )));
        }

        let payload = action.payload.to_json()?;
        let db = self.db()?;

        let result = db.connection().execute(
            r"INSERT INTO action_queue
              (action_id, kind, payload, enqueued_at, state, attempts, last_attempt_at, last_error)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                action.id.to_string(),
                action.kind().as_str(),
                payload,
                action.enqueued_at.to_rfc3339(),
                action.state.as_str(),
                action.attempts,
                action.last_attempt_at.map(|t| t.to_rfc3339()),
                action.last_error,
            ],
        );

        match result {
            Ok(_) => {
                tracing::debug!(action_id = %action.id, kind = %action.kind(), "action queued");
                Ok(())
            },
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(StockflowError::InvalidAction(format!(
                    "Action {} is already queued",
                    action.id
                )))
            },
            Err(e) => Err(StockflowError::StorageUnavailable(format!(
                "Failed to queue action: {e}"
            ))),
        }
    }

    /// All queued actions in enqueue order.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the query fails.
    pub fn list_all(&self) -> Result<Vec<QueuedAction>, StockflowError> {
        self.query(&format!("{SELECT_COLUMNS} ORDER BY seq ASC"), [])
    }

    /// Pending and Applying actions in enqueue order; what a drain works on.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the query fails.
    pub fn list_resumable(&self) -> Result<Vec<QueuedAction>, StockflowError> {
        self.query(
            &format!("{SELECT_COLUMNS} WHERE state IN ('pending', 'applying') ORDER BY seq ASC"),
            [],
        )
    }

    /// Actions in a given state, in enqueue order.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the query fails.
    pub fn list_by_state(&self, state: ActionState) -> Result<Vec<QueuedAction>, StockflowError> {
        self.query(
            &format!("{SELECT_COLUMNS} WHERE state = ?1 ORDER BY seq ASC"),
            [state.as_str()],
        )
    }

    /// Get one action by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the query fails.
    pub fn get(&self, id: &ActionId) -> Result<Option<QueuedAction>, StockflowError> {
        let db = self.db()?;
        db.connection()
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE action_id = ?1"),
                [id.to_string()],
                row_to_action,
            )
            .optional()
            .map_err(|e| StockflowError::StorageUnavailable(format!("Failed to query action: {e}")))
    }

    /// Delete one action. Removing a missing id is a no-op.
    ///
    /// Returns whether a row was deleted.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the delete fails.
    pub fn remove(&self, id: &ActionId) -> Result<bool, StockflowError> {
        let db = self.db()?;
        let rows = db
            .connection()
            .execute("DELETE FROM action_queue WHERE action_id = ?1", [id.to_string()])
            .map_err(|e| {
                StockflowError::StorageUnavailable(format!("Failed to remove action: {e}"))
            })?;
        Ok(rows > 0)
    }

    /// Delete every queued action. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the delete fails.
    pub fn clear(&self) -> Result<usize, StockflowError> {
        let db = self.db()?;
        db.connection()
            .execute("DELETE FROM action_queue", [])
            .map_err(|e| StockflowError::StorageUnavailable(format!("Failed to clear queue: {e}")))
    }

    /// Persist a state transition and attempt count.
    ///
    /// The transition is checked against the current stored state in the
    /// same statement, so a stale caller cannot move an action backwards.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the action is gone, `InvalidAction` if the
    /// transition is illegal, `StorageUnavailable` if the write fails.
    pub fn update_state(
        &self,
        id: &ActionId,
        new_state: ActionState,
        attempts: u32,
    ) -> Result<(), StockflowError> {
        let (first, second) = match new_state.predecessors() {
            [only] => (only.as_str(), only.as_str()),
            [first, second, ..] => (first.as_str(), second.as_str()),
            [] => {
                return Err(StockflowError::InvalidAction(format!(
                    "No transition leads to {new_state}"
                )))
            },
        };

        let db = self.db()?;
        let conn = db.connection();
        let rows = conn
            .execute(
                r"UPDATE action_queue
                  SET state = ?1, attempts = ?2, last_attempt_at = ?3
                  WHERE action_id = ?4 AND state IN (?5, ?6)",
                params![
                    new_state.as_str(),
                    attempts,
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                    first,
                    second,
                ],
            )
            .map_err(|e| {
                StockflowError::StorageUnavailable(format!("Failed to update action state: {e}"))
            })?;

        if rows > 0 {
            return Ok(());
        }

        let current: Option<String> = conn
            .query_row(
                "SELECT state FROM action_queue WHERE action_id = ?1",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StockflowError::StorageUnavailable(format!("Failed to query action: {e}")))?;

        match current {
            None => Err(StockflowError::NotFound(format!("Action {id}"))),
            Some(state) => Err(StockflowError::InvalidAction(format!(
                "Illegal transition for {id}: {state} -> {new_state}"
            ))),
        }
    }

    /// Resolve an Applying action into a terminal state and drop it.
    ///
    /// Applied and Conflicted actions leave the queue, so the transition and
    /// the removal are one delete guarded on the Applying state. Returns
    /// `false` if the action was removed concurrently (e.g. by a purge).
    ///
    /// # Errors
    ///
    /// Returns `InvalidAction` if `outcome` is not terminal,
    /// `StorageUnavailable` if the delete fails.
    pub fn complete(&self, id: &ActionId, outcome: ActionState) -> Result<bool, StockflowError> {
        if !outcome.is_terminal() {
            return Err(StockflowError::InvalidAction(format!(
                "{outcome} is not a terminal state"
            )));
        }

        let db = self.db()?;
        let rows = db
            .connection()
            .execute(
                "DELETE FROM action_queue WHERE action_id = ?1 AND state = 'applying'",
                [id.to_string()],
            )
            .map_err(|e| {
                StockflowError::StorageUnavailable(format!("Failed to complete action: {e}"))
            })?;
        Ok(rows > 0)
    }

    /// Record the latest failure message for an action.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the write fails.
    pub fn record_error(&self, id: &ActionId, error: &str) -> Result<(), StockflowError> {
        let db = self.db()?;
        db.connection()
            .execute(
                "UPDATE action_queue SET last_error = ?1 WHERE action_id = ?2",
                params![error, id.to_string()],
            )
            .map_err(|e| StockflowError::StorageUnavailable(format!("Failed to record error: {e}")))?;
        Ok(())
    }

    /// Move a Failed action back to Pending with a fresh attempt budget.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no failed action has this id.
    pub fn reset_for_retry(&self, id: &ActionId) -> Result<(), StockflowError> {
        let db = self.db()?;
        let rows = db
            .connection()
            .execute(
                r"UPDATE action_queue
                  SET state = 'pending', attempts = 0, last_error = NULL
                  WHERE action_id = ?1 AND state = 'failed'",
                [id.to_string()],
            )
            .map_err(|e| StockflowError::StorageUnavailable(format!("Failed to reset action: {e}")))?;

        if rows == 0 {
            return Err(StockflowError::NotFound(format!("Failed action {id}")));
        }
        Ok(())
    }

    /// Queue statistics.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the query fails.
    pub fn stats(&self) -> Result<QueueStats, StockflowError> {
        let db = self.db()?;
        let conn = db.connection();

        let mut stmt = conn
            .prepare("SELECT state, COUNT(*) FROM action_queue GROUP BY state")
            .map_err(|e| StockflowError::StorageUnavailable(format!("Failed to prepare query: {e}")))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)))
            .map_err(|e| StockflowError::StorageUnavailable(format!("Failed to count actions: {e}")))?;

        let mut stats = QueueStats::default();
        for row in rows {
            let (state, count) =
                row.map_err(|e| StockflowError::StorageUnavailable(e.to_string()))?;
            match state.parse::<ActionState>() {
                Ok(ActionState::Pending) => stats.pending = count,
                Ok(ActionState::Applying) => stats.applying = count,
                Ok(ActionState::Failed) => stats.failed = count,
                Ok(_) | Err(_) => stats.other += count,
            }
        }

        let oldest: Option<String> = conn
            .query_row(
                "SELECT enqueued_at FROM action_queue ORDER BY seq ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StockflowError::StorageUnavailable(format!("Failed to get oldest action: {e}")))?;

        stats.oldest_enqueued_at = oldest
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc));

        Ok(stats)
    }

    /// Claim the drain lease for `holder` until `ttl` from now.
    ///
    /// Succeeds when no lease exists, the current one has expired or it is
    /// already held by `holder` (a renewal). The check and the write are one
    /// statement, so two processes sharing the database cannot both win.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the write fails.
    pub fn acquire_lease(&self, holder: &str, ttl: Duration) -> Result<bool, StockflowError> {
        let now = Utc::now().timestamp_millis();
        let expires_at = now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));

        let db = self.db()?;
        let rows = db
            .connection()
            .execute(
                r"INSERT INTO sync_lease (id, holder, expires_at) VALUES (1, ?1, ?2)
                  ON CONFLICT(id) DO UPDATE
                  SET holder = excluded.holder, expires_at = excluded.expires_at
                  WHERE sync_lease.holder = ?1 OR sync_lease.expires_at <= ?3",
                params![holder, expires_at, now],
            )
            .map_err(|e| StockflowError::StorageUnavailable(format!("Failed to take sync lease: {e}")))?;
        Ok(rows > 0)
    }

    /// Drop the lease if `holder` still owns it.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the delete fails.
    pub fn release_lease(&self, holder: &str) -> Result<(), StockflowError> {
        let db = self.db()?;
        db.connection()
            .execute("DELETE FROM sync_lease WHERE id = 1 AND holder = ?1", [holder])
            .map_err(|e| {
                StockflowError::StorageUnavailable(format!("Failed to release sync lease: {e}"))
            })?;
        Ok(())
    }

    /// Holder of the unexpired drain lease, if any process is draining.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the query fails.
    pub fn lease_holder(&self) -> Result<Option<String>, StockflowError> {
        let db = self.db()?;
        db.connection()
            .query_row(
                "SELECT holder FROM sync_lease WHERE id = 1 AND expires_at > ?1",
                [Utc::now().timestamp_millis()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StockflowError::StorageUnavailable(format!("Failed to read sync lease: {e}")))
    }

    fn query<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<QueuedAction>, StockflowError> {
        let db = self.db()?;
        let mut stmt = db
            .connection()
            .prepare(sql)
            .map_err(|e| StockflowError::StorageUnavailable(format!("Failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params, row_to_action)
            .map_err(|e| StockflowError::StorageUnavailable(format!("Failed to query queue: {e}")))?;

        let mut actions = Vec::new();
        for row in rows {
            actions.push(row.map_err(|e| StockflowError::StorageUnavailable(e.to_string()))?);
        }
        Ok(actions)
    }
}

/// Queue statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    /// Actions waiting to be reconciled
    pub pending: u32,
    /// Actions interrupted mid-apply
    pub applying: u32,
    /// Actions parked after giving up
    pub failed: u32,
    /// Rows in any other state (normally zero)
    pub other: u32,
    /// Enqueue time of the oldest action
    pub oldest_enqueued_at: Option<DateTime<Utc>>,
}

impl QueueStats {
    /// Total number of queued actions.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.pending + self.applying + self.failed + self.other
    }
}

fn conversion_error(column: usize, err: StockflowError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn row_to_action(row: &Row<'_>) -> Result<QueuedAction, rusqlite::Error> {
    let id_str: String = row.get(0)?;
    let kind_str: String = row.get(1)?;
    let payload: String = row.get(2)?;
    let enqueued_at_str: String = row.get(3)?;
    let state_str: String = row.get(4)?;
    let attempts: u32 = row.get(5)?;
    let last_attempt_str: Option<String> = row.get(6)?;
    let last_error: Option<String> = row.get(7)?;

    let id = id_str.parse::<ActionId>().map_err(|e| conversion_error(0, e))?;
    let kind = kind_str.parse::<ActionKind>().map_err(|e| conversion_error(1, e))?;
    let payload = ActionPayload::from_json(kind, &payload).map_err(|e| conversion_error(2, e))?;
    let enqueued_at = DateTime::parse_from_rfc3339(&enqueued_at_str)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(3, StockflowError::Parse(e.to_string())))?;
    let state = state_str.parse::<ActionState>().map_err(|e| conversion_error(4, e))?;
    let last_attempt_at = last_attempt_str.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .ok()
    });

    Ok(QueuedAction {
        id,
        payload,
        enqueued_at,
        state,
        attempts,
        last_attempt_at,
        last_error,
    })
}
