//! Offline action queue and reconciliation.
//!
//! Actions created while the remote inventory is unreachable are persisted
//! locally and replayed later:
//! - Durable, ordered queue that survives restarts
//! - Per-action state machine so interrupted drains resume safely
//! - Idempotent replay keyed by action id
//! - Reject-if-insufficient-stock conflict policy
//! - One drain at a time, started on every offline to online transition

pub mod action;
pub mod engine;
pub mod gateway;
pub mod inspector;
pub mod queue;
pub mod report;
pub mod trigger;

pub use action::{
    retry_delay, ActionId, ActionKind, ActionPayload, ActionState, Actor, QueuedAction,
    RestockPayload, SaleLine, SalePayload,
};
pub use engine::{EngineConfig, ReconcileEngine};
pub use gateway::{ActionGateway, Submission};
pub use inspector::{ActionSummary, QueueInspector};
pub use queue::{ActionQueue, QueueStats};
pub use report::{
    ActionFailure, ActionOutcome, Conflict, FailureDisposition, Notice, NoticeLevel, SyncReport,
};
pub use trigger::{ConnectivityMonitor, SyncCoordinator};
