//! Reconciliation engine.
//!
//! Drains the action queue against the remote inventory in enqueue order.
//! Each action is marked Applying before any remote effect, so a drain that
//! dies mid-apply is resumed through the idempotency check instead of being
//! blindly replayed.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::action::{ActionId, ActionPayload, ActionState, QueuedAction, SalePayload};
use super::queue::ActionQueue;
use super::report::{ActionFailure, FailureDisposition, SyncReport};
use crate::config::Config;
use crate::error::StockflowError;
use crate::remote::{InventoryRemote, RemoteError, RestockOutcome, SaleOutcome};

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Transient failures tolerated before an action is parked as Failed
    pub max_attempts: u32,
    /// Upper bound for any single remote call
    pub remote_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            remote_timeout: Duration::from_secs(10),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.sync.max_attempts,
            remote_timeout: config.remote.timeout(),
        }
    }
}

/// How one action was resolved against the remote.
#[derive(Debug)]
enum Resolution {
    Applied,
    AlreadyApplied,
    Conflicted(String),
    Transient(RemoteError),
    Rejected(RemoteError),
}

impl From<RemoteError> for Resolution {
    fn from(err: RemoteError) -> Self {
        if err.is_transient() {
            Self::Transient(err)
        } else {
            Self::Rejected(err)
        }
    }
}

/// Whether the drain moves on to the next action.
enum Flow {
    Continue,
    Stop,
}

/// Drains the queue against a remote inventory.
pub struct ReconcileEngine {
    queue: Arc<ActionQueue>,
    remote: Arc<dyn InventoryRemote>,
    config: EngineConfig,
}

impl ReconcileEngine {
    #[must_use]
    pub fn new(queue: Arc<ActionQueue>, remote: Arc<dyn InventoryRemote>) -> Self {
        Self::with_config(queue, remote, EngineConfig::default())
    }

    #[must_use]
    pub fn with_config(
        queue: Arc<ActionQueue>,
        remote: Arc<dyn InventoryRemote>,
        config: EngineConfig,
    ) -> Self {
        Self {
            queue,
            remote,
            config,
        }
    }

    /// The queue this engine drains.
    #[must_use]
    pub const fn queue(&self) -> &Arc<ActionQueue> {
        &self.queue
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Drain every resumable action in enqueue order.
    ///
    /// Never fails: remote and storage problems end up in the report.
    /// The drain stops at the first transient failure so later actions never
    /// overtake an earlier one.
    pub async fn reconcile(&self) -> SyncReport {
        let mut report = SyncReport::default();

        let actions = match self.queue.list_resumable() {
            Ok(actions) => actions,
            Err(e) => {
                warn!(error = %e, "cannot read queue; sync aborted");
                report.abort(e.to_string());
                report.finished_at = Utc::now();
                return report;
            },
        };

        debug!(count = actions.len(), "draining queue");

        for action in &actions {
            match self.process(action, &mut report).await {
                Ok(Flow::Continue) => {},
                Ok(Flow::Stop) => break,
                Err(StockflowError::NotFound(_)) => {
                    debug!(action_id = %action.id, "action removed during drain; skipping");
                },
                Err(e) => {
                    warn!(action_id = %action.id, error = %e, "storage failure; sync aborted");
                    report.abort(e.to_string());
                    break;
                },
            }
        }

        report.remaining = match self.queue.stats() {
            Ok(stats) => (stats.pending + stats.applying) as usize,
            Err(_) => actions.len().saturating_sub(
                report.applied_count + report.conflicted_count + report.failed_count,
            ),
        };
        report.finished_at = Utc::now();

        info!(
            applied = report.applied_count,
            conflicted = report.conflicted_count,
            failed = report.failed_count,
            remaining = report.remaining,
            "sync finished"
        );
        report
    }

    async fn process(
        &self,
        action: &QueuedAction,
        report: &mut SyncReport,
    ) -> Result<Flow, StockflowError> {
        if action.state == ActionState::Applying {
            info!(action_id = %action.id, "resuming interrupted apply");
        }
        self.queue
            .update_state(&action.id, ActionState::Applying, action.attempts)?;
        debug!(action_id = %action.id, kind = %action.kind(), "applying");

        match self.resolve(action).await {
            Resolution::Applied | Resolution::AlreadyApplied => {
                if self.queue.complete(&action.id, ActionState::Applied)? {
                    debug!(action_id = %action.id, "applied");
                    report.record_applied(action.id);
                } else {
                    debug!(action_id = %action.id, "action left the queue during drain; not counted");
                }
                Ok(Flow::Continue)
            },
            Resolution::Conflicted(reason) => {
                if self.queue.complete(&action.id, ActionState::Conflicted)? {
                    info!(action_id = %action.id, %reason, "conflict; action dropped");
                    report.record_conflict(action.id, action.kind(), reason);
                } else {
                    debug!(action_id = %action.id, "action left the queue during drain; not counted");
                }
                Ok(Flow::Continue)
            },
            Resolution::Transient(err) => {
                let attempts = action.attempts.saturating_add(1);
                let disposition = if attempts >= self.config.max_attempts {
                    self.park(&action.id, attempts, &err)?;
                    warn!(action_id = %action.id, attempts, error = %err, "giving up after repeated failures");
                    FailureDisposition::GaveUp
                } else {
                    self.queue
                        .update_state(&action.id, ActionState::Pending, attempts)?;
                    self.queue.record_error(&action.id, &err.to_string())?;
                    info!(action_id = %action.id, attempts, error = %err, "transient failure; will retry");
                    FailureDisposition::WillRetry
                };
                report.record_failure(ActionFailure {
                    action_id: action.id,
                    kind: action.kind(),
                    error: err.to_string(),
                    attempts,
                    disposition,
                });
                Ok(Flow::Stop)
            },
            Resolution::Rejected(err) => {
                let attempts = action.attempts.saturating_add(1);
                self.park(&action.id, attempts, &err)?;
                warn!(action_id = %action.id, error = %err, "rejected by remote; parked");
                report.record_failure(ActionFailure {
                    action_id: action.id,
                    kind: action.kind(),
                    error: err.to_string(),
                    attempts,
                    disposition: FailureDisposition::Rejected,
                });
                Ok(Flow::Continue)
            },
        }
    }

    fn park(&self, id: &ActionId, attempts: u32, err: &RemoteError) -> Result<(), StockflowError> {
        self.queue.update_state(id, ActionState::Failed, attempts)?;
        self.queue.record_error(id, &err.to_string())
    }

    async fn resolve(&self, action: &QueuedAction) -> Resolution {
        match self.call(self.remote.is_applied(&action.id)).await {
            Ok(true) => {
                debug!(action_id = %action.id, "already applied remotely");
                return Resolution::AlreadyApplied;
            },
            Ok(false) => {},
            Err(e) => return e.into(),
        }

        match &action.payload {
            ActionPayload::Sale(sale) => self.resolve_sale(&action.id, sale).await,
            ActionPayload::Restock(restock) => {
                match self.call(self.remote.apply_restock(&action.id, restock)).await {
                    Ok(RestockOutcome::Applied) => Resolution::Applied,
                    Ok(RestockOutcome::AlreadyApplied) => Resolution::AlreadyApplied,
                    Err(e) => e.into(),
                }
            },
        }
    }

    async fn resolve_sale(&self, id: &ActionId, sale: &SalePayload) -> Resolution {
        // Lines naming the same product are checked against their combined quantity.
        let mut requested: BTreeMap<&str, (u32, &str)> = BTreeMap::new();
        for line in &sale.items {
            let entry = requested
                .entry(line.product_id.as_str())
                .or_insert((0, line.product_name.as_str()));
            entry.0 = entry.0.saturating_add(line.quantity);
        }

        for (product_id, (quantity, name)) in &requested {
            match self.call(self.remote.product_stock(product_id)).await {
                Ok(available) if available < *quantity => {
                    return Resolution::Conflicted(insufficient_stock(name, available, *quantity));
                },
                Ok(_) => {},
                Err(RemoteError::ProductNotFound(_)) => {
                    return Resolution::Conflicted(missing_product(name));
                },
                Err(e) => return e.into(),
            }
        }

        match self.call(self.remote.apply_sale(id, sale)).await {
            Ok(SaleOutcome::Applied) => Resolution::Applied,
            Ok(SaleOutcome::AlreadyApplied) => Resolution::AlreadyApplied,
            Ok(SaleOutcome::InsufficientStock {
                product_id,
                available,
            }) => {
                let (quantity, name) = requested
                    .get(product_id.as_str())
                    .copied()
                    .unwrap_or((0, product_id.as_str()));
                Resolution::Conflicted(insufficient_stock(name, available, quantity))
            },
            Err(RemoteError::ProductNotFound(product_id)) => {
                let name = requested
                    .get(product_id.as_str())
                    .map_or(product_id.as_str(), |(_, name)| *name);
                Resolution::Conflicted(missing_product(name))
            },
            Err(e) => e.into(),
        }
    }

    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, RemoteError>> + Send,
    ) -> Result<T, RemoteError> {
        match tokio::time::timeout(self.config.remote_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(self.config.remote_timeout)),
        }
    }
}

fn insufficient_stock(name: &str, available: u32, requested: u32) -> String {
    format!(
        "Sale for {name} skipped: insufficient stock ({available} available, {requested} requested)"
    )
}

fn missing_product(name: &str) -> String {
    format!("Sale for {name} skipped: product no longer exists")
}
