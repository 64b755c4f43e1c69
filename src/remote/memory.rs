//! In-process inventory.
//!
//! Behaves like the shared inventory (atomic, idempotent applies) and adds
//! knobs for going offline, failing calls and losing responses, so the
//! reconciliation engine can be exercised without a network.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{ConnectivityProbe, InventoryRemote, RemoteError, RestockOutcome, SaleOutcome};
use crate::sync::action::{ActionId, Actor, RestockPayload, SaleLine, SalePayload};

/// A product as held by the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub id: String,
    pub name: String,
    pub quantity: u32,
    pub low_stock_threshold: u32,
}

/// A recorded sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleRecord {
    pub action_id: ActionId,
    pub items: Vec<SaleLine>,
    pub attendant: Actor,
    pub total_cents: u64,
    pub recorded_at: DateTime<Utc>,
}

/// A recorded restock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestockRecord {
    pub action_id: ActionId,
    pub product_id: String,
    pub quantity: u32,
    pub actor: Actor,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug)]
struct State {
    products: BTreeMap<String, ProductRecord>,
    applied: HashSet<ActionId>,
    sales: Vec<SaleRecord>,
    restocks: Vec<RestockRecord>,
    online: bool,
    fail_next: u32,
    lose_next: u32,
    latency: Duration,
    calls: u64,
}

/// Thread-safe in-memory inventory.
#[derive(Debug)]
pub struct MemoryInventory {
    state: Mutex<State>,
}

impl Default for MemoryInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryInventory {
    /// An empty, online inventory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                products: BTreeMap::new(),
                applied: HashSet::new(),
                sales: Vec::new(),
                restocks: Vec::new(),
                online: true,
                fail_next: 0,
                lose_next: 0,
                latency: Duration::ZERO,
                calls: 0,
            }),
        }
    }

    /// Builder-style product insert.
    #[must_use]
    pub fn with_product(self, id: &str, name: &str, quantity: u32) -> Self {
        self.upsert_product(ProductRecord {
            id: id.to_string(),
            name: name.to_string(),
            quantity,
            low_stock_threshold: 0,
        });
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves no partial writes behind.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Insert or replace a product.
    pub fn upsert_product(&self, product: ProductRecord) {
        self.lock().products.insert(product.id.clone(), product);
    }

    /// Delete a product.
    pub fn remove_product(&self, id: &str) -> bool {
        self.lock().products.remove(id).is_some()
    }

    /// Overwrite a stock level, as another device's write would.
    pub fn set_stock(&self, id: &str, quantity: u32) {
        if let Some(product) = self.lock().products.get_mut(id) {
            product.quantity = quantity;
        }
    }

    /// Current stock level.
    #[must_use]
    pub fn stock(&self, id: &str) -> Option<u32> {
        self.lock().products.get(id).map(|p| p.quantity)
    }

    /// Recorded sales in apply order.
    #[must_use]
    pub fn sales(&self) -> Vec<SaleRecord> {
        self.lock().sales.clone()
    }

    /// Recorded restocks in apply order.
    #[must_use]
    pub fn restocks(&self) -> Vec<RestockRecord> {
        self.lock().restocks.clone()
    }

    /// Number of calls made against the inventory.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.lock().calls
    }

    pub fn set_online(&self, online: bool) {
        self.lock().online = online;
    }

    /// Fail the next `n` calls with `Unavailable`.
    pub fn fail_next(&self, n: u32) {
        self.lock().fail_next = n;
    }

    /// Commit the next `n` applies but report `Unavailable` to the caller.
    pub fn lose_next_response(&self, n: u32) {
        self.lock().lose_next = n;
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    async fn delay(&self) {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn enter(&self) -> Result<MutexGuard<'_, State>, RemoteError> {
        let mut state = self.lock();
        state.calls += 1;
        if !state.online {
            return Err(RemoteError::Unavailable("inventory offline".to_string()));
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(RemoteError::Unavailable("injected failure".to_string()));
        }
        Ok(state)
    }
}

impl State {
    fn take_lost_response(&mut self) -> Result<(), RemoteError> {
        if self.lose_next > 0 {
            self.lose_next -= 1;
            return Err(RemoteError::Unavailable("response lost".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryRemote for MemoryInventory {
    async fn product_stock(&self, product_id: &str) -> Result<u32, RemoteError> {
        self.delay().await;
        let state = self.enter()?;
        state
            .products
            .get(product_id)
            .map(|p| p.quantity)
            .ok_or_else(|| RemoteError::ProductNotFound(product_id.to_string()))
    }

    async fn is_applied(&self, action_id: &ActionId) -> Result<bool, RemoteError> {
        self.delay().await;
        let state = self.enter()?;
        Ok(state.applied.contains(action_id))
    }

    async fn apply_sale(
        &self,
        action_id: &ActionId,
        sale: &SalePayload,
    ) -> Result<SaleOutcome, RemoteError> {
        self.delay().await;
        let mut state = self.enter()?;
        if state.applied.contains(action_id) {
            return Ok(SaleOutcome::AlreadyApplied);
        }

        // Validate every line before touching stock so the write is all or nothing.
        let mut requested: BTreeMap<&str, u32> = BTreeMap::new();
        for line in &sale.items {
            let total = requested.entry(line.product_id.as_str()).or_default();
            *total = total.saturating_add(line.quantity);
        }
        for (product_id, quantity) in &requested {
            let available = state
                .products
                .get(*product_id)
                .map(|p| p.quantity)
                .ok_or_else(|| RemoteError::ProductNotFound((*product_id).to_string()))?;
            if available < *quantity {
                return Ok(SaleOutcome::InsufficientStock {
                    product_id: (*product_id).to_string(),
                    available,
                });
            }
        }
        for (product_id, quantity) in &requested {
            if let Some(product) = state.products.get_mut(*product_id) {
                product.quantity -= quantity;
            }
        }

        state.applied.insert(*action_id);
        state.sales.push(SaleRecord {
            action_id: *action_id,
            items: sale.items.clone(),
            attendant: sale.attendant.clone(),
            total_cents: sale.total_cents(),
            recorded_at: Utc::now(),
        });
        state.take_lost_response()?;
        Ok(SaleOutcome::Applied)
    }

    async fn apply_restock(
        &self,
        action_id: &ActionId,
        restock: &RestockPayload,
    ) -> Result<RestockOutcome, RemoteError> {
        self.delay().await;
        let mut state = self.enter()?;
        if state.applied.contains(action_id) {
            return Ok(RestockOutcome::AlreadyApplied);
        }

        let product = state
            .products
            .get_mut(&restock.product_id)
            .ok_or_else(|| RemoteError::ProductNotFound(restock.product_id.clone()))?;
        product.quantity = product.quantity.saturating_add(restock.quantity);

        state.applied.insert(*action_id);
        state.restocks.push(RestockRecord {
            action_id: *action_id,
            product_id: restock.product_id.clone(),
            quantity: restock.quantity,
            actor: restock.actor.clone(),
            recorded_at: Utc::now(),
        });
        state.take_lost_response()?;
        Ok(RestockOutcome::Applied)
    }
}

#[async_trait]
impl ConnectivityProbe for MemoryInventory {
    async fn is_online(&self) -> bool {
        self.lock().online
    }
}
