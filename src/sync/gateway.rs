//! Submission entry point for screens that create actions.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::action::{ActionId, ActionPayload, QueuedAction};
use super::report::ActionOutcome;
use super::trigger::{ConnectivityMonitor, SyncCoordinator};
use crate::error::StockflowError;

/// What happened to a submitted action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Submission {
    /// Applied to the remote inventory.
    Applied { action_id: ActionId },
    /// Stored locally; syncs when the remote is reachable.
    Queued { action_id: ActionId },
    /// Dropped by the conflict policy.
    Conflicted { action_id: ActionId, reason: String },
}

impl Submission {
    #[must_use]
    pub const fn action_id(&self) -> &ActionId {
        match self {
            Self::Applied { action_id }
            | Self::Queued { action_id }
            | Self::Conflicted { action_id, .. } => action_id,
        }
    }
}

/// Accepts actions online or offline.
pub struct ActionGateway {
    coordinator: Arc<SyncCoordinator>,
    connectivity: Arc<ConnectivityMonitor>,
}

impl ActionGateway {
    #[must_use]
    pub const fn new(
        coordinator: Arc<SyncCoordinator>,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self {
            coordinator,
            connectivity,
        }
    }

    /// Validate and persist an action, then apply it if the remote is reachable.
    ///
    /// The action always goes through the queue so it lands behind any older
    /// queued work. Offline, this returns as soon as the action is durable.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAction` for a malformed payload and
    /// `StorageUnavailable` if the action cannot be persisted; in both cases
    /// nothing was queued.
    pub async fn submit(&self, payload: ActionPayload) -> Result<Submission, StockflowError> {
        let action = QueuedAction::new(payload);
        let action_id = action.id;
        self.coordinator.engine().queue().append(&action)?;

        if !self.connectivity.is_online() {
            info!(%action_id, kind = %action.kind(), "offline; action queued");
            return Ok(Submission::Queued { action_id });
        }

        let Some(report) = self.coordinator.try_reconcile().await else {
            return Ok(Submission::Queued { action_id });
        };

        let submission = match report.outcome_of(&action_id) {
            ActionOutcome::Applied => Submission::Applied { action_id },
            ActionOutcome::Conflicted(reason) => Submission::Conflicted {
                action_id,
                reason: reason.to_string(),
            },
            ActionOutcome::Failed(_) | ActionOutcome::NotReached => {
                Submission::Queued { action_id }
            },
        };
        Ok(submission)
    }
}
