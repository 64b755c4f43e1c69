//! Remote inventory collaborators.
//!
//! The reconciliation engine only talks to the shared inventory through
//! [`InventoryRemote`]. Implementations must make `apply_sale` and
//! `apply_restock` atomic and idempotent by action id; the engine relies on
//! that and never writes stock levels itself.

mod http;
mod memory;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::sync::action::{ActionId, RestockPayload, SalePayload};

pub use http::HttpInventory;
pub use memory::{MemoryInventory, ProductRecord, RestockRecord, SaleRecord};

/// Errors returned by a remote inventory.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Network or remote service unavailable; worth retrying.
    #[error("Remote inventory unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the timeout; worth retrying.
    #[error("Remote inventory did not respond within {0:?}")]
    Timeout(Duration),

    /// The product does not exist remotely.
    #[error("Product {0} not found")]
    ProductNotFound(String),

    /// The remote refused the request; retrying will not help.
    #[error("Remote inventory rejected the request: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Whether a later retry could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Result of an atomic sale apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaleOutcome {
    /// Stock decremented and the sale recorded.
    Applied,
    /// A sale with this action id was recorded earlier; nothing changed.
    AlreadyApplied,
    /// A line exceeded available stock; nothing changed.
    InsufficientStock { product_id: String, available: u32 },
}

/// Result of an atomic restock apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestockOutcome {
    /// Stock incremented and the restock recorded.
    Applied,
    /// A restock with this action id was recorded earlier; nothing changed.
    AlreadyApplied,
}

/// The shared, remotely owned inventory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventoryRemote: Send + Sync {
    /// Latest committed stock quantity of a product.
    async fn product_stock(&self, product_id: &str) -> Result<u32, RemoteError>;

    /// Whether a sale or restock tagged with `action_id` was already recorded.
    async fn is_applied(&self, action_id: &ActionId) -> Result<bool, RemoteError>;

    /// Atomically decrement stock for every line and record the sale.
    async fn apply_sale(
        &self,
        action_id: &ActionId,
        sale: &SalePayload,
    ) -> Result<SaleOutcome, RemoteError>;

    /// Atomically increment stock and record the restock.
    async fn apply_restock(
        &self,
        action_id: &ActionId,
        restock: &RestockPayload,
    ) -> Result<RestockOutcome, RemoteError>;
}

/// Source of the "is the inventory reachable" signal.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Stand-in used when no remote is configured: always offline.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unconfigured;

const UNCONFIGURED: &str = "no remote inventory configured (set remote.base_url)";

#[async_trait]
impl InventoryRemote for Unconfigured {
    async fn product_stock(&self, _product_id: &str) -> Result<u32, RemoteError> {
        Err(RemoteError::Unavailable(UNCONFIGURED.to_string()))
    }

    async fn is_applied(&self, _action_id: &ActionId) -> Result<bool, RemoteError> {
        Err(RemoteError::Unavailable(UNCONFIGURED.to_string()))
    }

    async fn apply_sale(
        &self,
        _action_id: &ActionId,
        _sale: &SalePayload,
    ) -> Result<SaleOutcome, RemoteError> {
        Err(RemoteError::Unavailable(UNCONFIGURED.to_string()))
    }

    async fn apply_restock(
        &self,
        _action_id: &ActionId,
        _restock: &RestockPayload,
    ) -> Result<RestockOutcome, RemoteError> {
        Err(RemoteError::Unavailable(UNCONFIGURED.to_string()))
    }
}

#[async_trait]
impl ConnectivityProbe for Unconfigured {
    async fn is_online(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RemoteError::Unavailable("down".to_string()).is_transient());
        assert!(RemoteError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!RemoteError::ProductNotFound("p1".to_string()).is_transient());
        assert!(!RemoteError::Rejected("400".to_string()).is_transient());
    }

    #[tokio::test]
    async fn test_unconfigured_is_offline() {
        assert!(!Unconfigured.is_online().await);
        let err = Unconfigured.product_stock("p1").await.unwrap_err();
        assert!(err.is_transient());
    }
}
