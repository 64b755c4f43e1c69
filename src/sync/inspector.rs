//! Operator-facing queue view and manual controls.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::action::{ActionId, ActionKind, ActionState, QueuedAction};
use super::queue::{ActionQueue, QueueStats};
use super::report::SyncReport;
use super::trigger::SyncCoordinator;
use crate::error::StockflowError;

/// A queued action as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionSummary {
    pub id: ActionId,
    pub kind: ActionKind,
    pub enqueued_at: DateTime<Utc>,
    pub state: ActionState,
    pub attempts: u32,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ActionSummary {
    fn from_action(action: &QueuedAction, currency_symbol: &str) -> Self {
        Self {
            id: action.id,
            kind: action.kind(),
            enqueued_at: action.enqueued_at,
            state: action.state,
            attempts: action.attempts,
            description: action.describe(currency_symbol),
            last_error: action.last_error.clone(),
        }
    }
}

/// Read-mostly access to the queue plus "sync now" and "clear".
pub struct QueueInspector {
    coordinator: Arc<SyncCoordinator>,
    currency_symbol: String,
}

impl QueueInspector {
    #[must_use]
    pub fn new(coordinator: Arc<SyncCoordinator>, currency_symbol: impl Into<String>) -> Self {
        Self {
            coordinator,
            currency_symbol: currency_symbol.into(),
        }
    }

    fn queue(&self) -> &ActionQueue {
        self.coordinator.engine().queue()
    }

    /// Every queued action in enqueue order. Never mutates.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the queue cannot be read.
    pub fn peek(&self) -> Result<Vec<ActionSummary>, StockflowError> {
        Ok(self
            .queue()
            .list_all()?
            .iter()
            .map(|action| ActionSummary::from_action(action, &self.currency_symbol))
            .collect())
    }

    /// Drain now, e.g. when connectivity came back without an event.
    ///
    /// # Errors
    ///
    /// Returns `SyncInProgress` if a drain is already running.
    pub async fn force_sync(&self) -> Result<SyncReport, StockflowError> {
        info!("manual sync requested");
        self.coordinator
            .try_reconcile()
            .await
            .ok_or(StockflowError::SyncInProgress)
    }

    /// Delete every queued action. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the delete fails.
    pub fn purge(&self) -> Result<usize, StockflowError> {
        let removed = self.queue().clear()?;
        warn!(removed, "queue purged");
        Ok(removed)
    }

    /// Queue counts.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the queue cannot be read.
    pub fn stats(&self) -> Result<QueueStats, StockflowError> {
        self.queue().stats()
    }

    /// Put one Failed action back in line.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no failed action has this id.
    pub fn retry(&self, id: &ActionId) -> Result<(), StockflowError> {
        self.queue().reset_for_retry(id)?;
        info!(action_id = %id, "failed action requeued");
        Ok(())
    }

    /// Put every Failed action back in line. Returns how many were reset.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the queue cannot be read or written.
    pub fn retry_all_failed(&self) -> Result<usize, StockflowError> {
        let failed = self.queue().list_by_state(ActionState::Failed)?;
        for action in &failed {
            self.queue().reset_for_retry(&action.id)?;
        }
        if !failed.is_empty() {
            info!(count = failed.len(), "failed actions requeued");
        }
        Ok(failed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryInventory;
    use crate::storage::Database;
    use crate::sync::action::Actor;
    use crate::sync::engine::ReconcileEngine;

    fn create_inspector(inventory: Arc<MemoryInventory>) -> QueueInspector {
        let queue = Arc::new(ActionQueue::with_database(Database::open_in_memory().unwrap()));
        let coordinator = Arc::new(SyncCoordinator::new(ReconcileEngine::new(queue, inventory)));
        QueueInspector::new(coordinator, "E")
    }

    fn restock(product_id: &str) -> QueuedAction {
        QueuedAction::restock(product_id, "Milk", 4, Actor::new("u1", "u1@shop"))
    }

    #[test]
    fn test_peek_describes_actions() {
        let inspector = create_inspector(Arc::new(MemoryInventory::new()));
        let action = restock("p1");
        inspector.queue().append(&action).unwrap();

        let summaries = inspector.peek().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, action.id);
        assert_eq!(summaries[0].description, "Restock of 4 x Milk by u1@shop");

        // Peeking does not change anything.
        assert_eq!(inspector.peek().unwrap(), summaries);
    }

    #[tokio::test]
    async fn test_force_sync_drains() {
        let inventory = Arc::new(MemoryInventory::new().with_product("p1", "Milk", 1));
        let inspector = create_inspector(inventory.clone());
        inspector.queue().append(&restock("p1")).unwrap();

        let report = inspector.force_sync().await.unwrap();
        assert_eq!(report.applied_count, 1);
        assert_eq!(inventory.stock("p1"), Some(5));
        assert_eq!(inspector.stats().unwrap().total(), 0);
    }

    #[test]
    fn test_purge() {
        let inspector = create_inspector(Arc::new(MemoryInventory::new()));
        inspector.queue().append(&restock("p1")).unwrap();
        inspector.queue().append(&restock("p2")).unwrap();

        assert_eq!(inspector.purge().unwrap(), 2);
        assert!(inspector.peek().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_all_failed() {
        let inventory = Arc::new(MemoryInventory::new());
        let inspector = create_inspector(inventory.clone());
        inspector.queue().append(&restock("p1")).unwrap();

        // Unknown product: rejected and parked.
        let report = inspector.force_sync().await.unwrap();
        assert_eq!(report.failed_count, 1);
        assert_eq!(inspector.stats().unwrap().failed, 1);

        inventory.upsert_product(crate::remote::ProductRecord {
            id: "p1".to_string(),
            name: "Milk".to_string(),
            quantity: 0,
            low_stock_threshold: 2,
        });
        assert_eq!(inspector.retry_all_failed().unwrap(), 1);

        let report = inspector.force_sync().await.unwrap();
        assert_eq!(report.applied_count, 1);
        assert_eq!(inventory.stock("p1"), Some(4));
    }

    #[test]
    fn test_retry_unknown_action() {
        let inspector = create_inspector(Arc::new(MemoryInventory::new()));
        let err = inspector.retry(&ActionId::generate()).unwrap_err();
        assert!(matches!(err, StockflowError::NotFound(_)));
    }
}
