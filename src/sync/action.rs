//! Action model for the offline queue.
//!
//! A [`QueuedAction`] is the envelope a point-of-sale screen builds when it
//! cannot reach the remote inventory: a kind-specific payload plus the
//! metadata the reconciliation engine needs (id, state, attempts).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StockflowError;

/// Unique, time-sortable action identifier (UUID v7).
///
/// Doubles as the idempotency key for remote applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(Uuid);

impl ActionId {
    /// Generate a fresh id from the current time.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for ActionId {
    type Err = StockflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| StockflowError::Parse(format!("Invalid action id '{s}': {e}")))
    }
}

/// Kinds of actions that can be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// A point-of-sale transaction.
    Sale,
    /// Stock added to a product.
    Restock,
}

impl ActionKind {
    /// Storage and wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::Restock => "restock",
        }
    }

    /// Display name.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Sale => "Sale",
            Self::Restock => "Restock",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ActionKind {
    type Err = StockflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sale" => Ok(Self::Sale),
            "restock" => Ok(Self::Restock),
            other => Err(StockflowError::Parse(format!("Unknown action kind: {other}"))),
        }
    }
}

/// Reconciliation state of a queued action.
///
/// Forward-only: `Pending -> Applying -> {Applied | Conflicted | Pending | Failed}`.
/// `Failed -> Pending` happens only through an explicit operator retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    /// Waiting to be reconciled.
    Pending,
    /// A remote apply may be in flight; resolved on the next drain.
    Applying,
    /// Applied remotely.
    Applied,
    /// Rejected by the stock check; dropped and reported.
    Conflicted,
    /// Given up on; parked for the operator.
    Failed,
}

impl ActionState {
    /// Storage name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Applying => "applying",
            Self::Applied => "applied",
            Self::Conflicted => "conflicted",
            Self::Failed => "failed",
        }
    }

    /// Applied and Conflicted actions leave the queue.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Applied | Self::Conflicted)
    }

    /// States from which a transition into `self` is legal.
    #[must_use]
    pub const fn predecessors(&self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Applying, Self::Failed],
            // Applying -> Applying when a crashed drain is resumed.
            Self::Applying => &[Self::Pending, Self::Applying],
            Self::Applied | Self::Conflicted | Self::Failed => &[Self::Applying],
        }
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionState {
    type Err = StockflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "applying" => Ok(Self::Applying),
            "applied" => Ok(Self::Applied),
            "conflicted" => Ok(Self::Conflicted),
            "failed" => Ok(Self::Failed),
            other => Err(StockflowError::Parse(format!("Unknown action state: {other}"))),
        }
    }
}

/// The person behind an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub email: String,
}

impl Actor {
    #[must_use]
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

/// One line of a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleLine {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: u64,
}

impl SaleLine {
    /// Line total in cents.
    #[must_use]
    pub fn total_cents(&self) -> u64 {
        self.unit_price_cents.saturating_mul(u64::from(self.quantity))
    }
}

/// Payload for a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalePayload {
    pub items: Vec<SaleLine>,
    pub attendant: Actor,
}

impl SalePayload {
    /// Sale total in cents.
    #[must_use]
    pub fn total_cents(&self) -> u64 {
        self.items
            .iter()
            .fold(0, |sum, line| sum.saturating_add(line.total_cents()))
    }

    /// Total units across all lines.
    #[must_use]
    pub fn unit_count(&self) -> u64 {
        self.items.iter().map(|line| u64::from(line.quantity)).sum()
    }
}

/// Payload for a restock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestockPayload {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub actor: Actor,
}

/// Kind-specific action data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ActionPayload {
    Sale(SalePayload),
    Restock(RestockPayload),
}

impl ActionPayload {
    /// The action kind carried by this payload.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Sale(_) => ActionKind::Sale,
            Self::Restock(_) => ActionKind::Restock,
        }
    }

    /// Check the payload before it is accepted into the queue.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAction` describing the first problem found.
    pub fn validate(&self) -> Result<(), StockflowError> {
        match self {
            Self::Sale(sale) => {
                if sale.items.is_empty() {
                    return Err(StockflowError::InvalidAction(
                        "A sale needs at least one item".to_string(),
                    ));
                }
                validate_actor(&sale.attendant)?;
                for line in &sale.items {
                    if line.product_id.trim().is_empty() {
                        return Err(StockflowError::InvalidAction(
                            "Sale item is missing a product id".to_string(),
                        ));
                    }
                    if line.quantity == 0 {
                        return Err(StockflowError::InvalidAction(format!(
                            "Quantity for {} must be greater than zero",
                            line.product_name
                        )));
                    }
                }
                Ok(())
            },
            Self::Restock(restock) => {
                if restock.product_id.trim().is_empty() {
                    return Err(StockflowError::InvalidAction(
                        "Restock is missing a product id".to_string(),
                    ));
                }
                if restock.quantity == 0 {
                    return Err(StockflowError::InvalidAction(format!(
                        "Restock quantity for {} must be greater than zero",
                        restock.product_name
                    )));
                }
                validate_actor(&restock.actor)
            },
        }
    }

    /// Serialize only the inner payload (the kind is stored separately).
    ///
    /// # Errors
    ///
    /// Returns `Parse` if serialization fails.
    pub fn to_json(&self) -> Result<String, StockflowError> {
        let json = match self {
            Self::Sale(sale) => serde_json::to_string(sale)?,
            Self::Restock(restock) => serde_json::to_string(restock)?,
        };
        Ok(json)
    }

    /// Rebuild a payload from its kind and inner JSON.
    ///
    /// # Errors
    ///
    /// Returns `Parse` if the JSON does not match the kind.
    pub fn from_json(kind: ActionKind, json: &str) -> Result<Self, StockflowError> {
        let payload = match kind {
            ActionKind::Sale => Self::Sale(serde_json::from_str(json)?),
            ActionKind::Restock => Self::Restock(serde_json::from_str(json)?),
        };
        Ok(payload)
    }

    /// Human-readable one-line description.
    #[must_use]
    pub fn describe(&self, currency_symbol: &str) -> String {
        match self {
            Self::Sale(sale) => {
                let lines: Vec<String> = sale
                    .items
                    .iter()
                    .map(|line| format!("{} x {}", line.quantity, line.product_name))
                    .collect();
                format!(
                    "Sale of {} {} ({}) by {}, total {}",
                    sale.unit_count(),
                    if sale.unit_count() == 1 { "item" } else { "items" },
                    lines.join(", "),
                    actor_label(&sale.attendant),
                    format_money(sale.total_cents(), currency_symbol)
                )
            },
            Self::Restock(restock) => format!(
                "Restock of {} x {} by {}",
                restock.quantity,
                restock.product_name,
                actor_label(&restock.actor)
            ),
        }
    }
}

fn validate_actor(actor: &Actor) -> Result<(), StockflowError> {
    if actor.id.trim().is_empty() {
        return Err(StockflowError::InvalidAction(
            "Action has no actor identity".to_string(),
        ));
    }
    Ok(())
}

/// A queued action with its reconciliation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedAction {
    /// Unique id, also the remote idempotency key
    pub id: ActionId,
    /// Kind-specific data
    #[serde(flatten)]
    pub payload: ActionPayload,
    /// When the action was created (client clock)
    pub enqueued_at: DateTime<Utc>,
    /// Current state
    pub state: ActionState,
    /// Reconciliation attempts that ended in a transient failure
    pub attempts: u32,
    /// Last reconciliation attempt
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Last failure message
    pub last_error: Option<String>,
}

impl QueuedAction {
    /// Create a new pending action with a fresh id.
    #[must_use]
    pub fn new(payload: ActionPayload) -> Self {
        Self {
            id: ActionId::generate(),
            payload,
            enqueued_at: Utc::now(),
            state: ActionState::Pending,
            attempts: 0,
            last_attempt_at: None,
            last_error: None,
        }
    }

    /// Create a sale action.
    #[must_use]
    pub fn sale(items: Vec<SaleLine>, attendant: Actor) -> Self {
        Self::new(ActionPayload::Sale(SalePayload { items, attendant }))
    }

    /// Create a restock action.
    #[must_use]
    pub fn restock(
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        quantity: u32,
        actor: Actor,
    ) -> Self {
        Self::new(ActionPayload::Restock(RestockPayload {
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity,
            actor,
        }))
    }

    /// The action kind.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        self.payload.kind()
    }

    /// Human-readable one-line description.
    #[must_use]
    pub fn describe(&self, currency_symbol: &str) -> String {
        self.payload.describe(currency_symbol)
    }
}

fn actor_label(actor: &Actor) -> &str {
    if actor.email.is_empty() {
        &actor.id
    } else {
        &actor.email
    }
}

/// Exponential backoff: `base * 2^attempts`, capped at `max`.
#[must_use]
pub fn retry_delay(attempts: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2_u32.checked_pow(attempts).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

/// Format an amount in cents with thousands separators and two decimals.
#[must_use]
pub fn format_money(cents: u64, symbol: &str) -> String {
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{symbol}{grouped}.{:02}", cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn milk(quantity: u32) -> SaleLine {
        SaleLine {
            product_id: "p-milk".to_string(),
            product_name: "Milk".to_string(),
            quantity,
            unit_price_cents: 1_250,
        }
    }

    fn clerk() -> Actor {
        Actor::new("u1", "clerk@shop.example")
    }

    #[test]
    fn test_ids_are_unique_and_sortable() {
        let first = ActionId::generate();
        let second = ActionId::generate();
        assert_ne!(first, second);
        assert!(first < second);
    }

    #[test]
    fn test_action_id_round_trips_through_string() {
        let id = ActionId::generate();
        let parsed: ActionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<ActionId>().is_err());
    }

    #[test]
    fn test_state_predecessors() {
        use ActionState::*;

        assert_eq!(Applying.predecessors(), &[Pending, Applying]);
        assert_eq!(Pending.predecessors(), &[Applying, Failed]);
        assert!(!Applied.predecessors().contains(&Pending));
        assert!(!Pending.predecessors().contains(&Conflicted));
    }

    #[test]
    fn test_state_flags() {
        assert!(ActionState::Applied.is_terminal());
        assert!(ActionState::Conflicted.is_terminal());
        assert!(!ActionState::Failed.is_terminal());
    }

    #[test]
    fn test_sale_validation() {
        let empty = ActionPayload::Sale(SalePayload {
            items: vec![],
            attendant: clerk(),
        });
        assert!(matches!(
            empty.validate(),
            Err(StockflowError::InvalidAction(_))
        ));

        let zero = ActionPayload::Sale(SalePayload {
            items: vec![milk(0)],
            attendant: clerk(),
        });
        assert!(zero.validate().is_err());

        let ok = ActionPayload::Sale(SalePayload {
            items: vec![milk(2)],
            attendant: clerk(),
        });
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_restock_requires_actor() {
        let payload = ActionPayload::Restock(RestockPayload {
            product_id: "p-milk".to_string(),
            product_name: "Milk".to_string(),
            quantity: 5,
            actor: Actor::new("", ""),
        });
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_payload_json_by_kind() {
        let action = QueuedAction::restock("p-milk", "Milk", 10, clerk());
        let json = action.payload.to_json().unwrap();
        assert!(json.contains("\"productId\":\"p-milk\""));

        let restored = ActionPayload::from_json(ActionKind::Restock, &json).unwrap();
        assert_eq!(restored, action.payload);
        assert!(ActionPayload::from_json(ActionKind::Sale, &json).is_err());
    }

    #[test]
    fn test_describe() {
        let sale = QueuedAction::sale(
            vec![
                milk(2),
                SaleLine {
                    product_id: "p-bread".to_string(),
                    product_name: "Bread".to_string(),
                    quantity: 1,
                    unit_price_cents: 1_000,
                },
            ],
            clerk(),
        );
        assert_eq!(
            sale.describe("E"),
            "Sale of 3 items (2 x Milk, 1 x Bread) by clerk@shop.example, total E35.00"
        );

        let restock = QueuedAction::restock("p-milk", "Milk", 10, Actor::new("u2", ""));
        assert_eq!(restock.describe("E"), "Restock of 10 x Milk by u2");
    }

    #[test]
    fn test_retry_delay() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(300);

        assert_eq!(retry_delay(0, base, max), Duration::from_secs(5));
        assert_eq!(retry_delay(1, base, max), Duration::from_secs(10));
        assert_eq!(retry_delay(5, base, max), Duration::from_secs(160));
        assert_eq!(retry_delay(10, base, max), max);
        assert_eq!(retry_delay(64, base, max), max);
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(0, "E"), "E0.00");
        assert_eq!(format_money(1_250, "E"), "E12.50");
        assert_eq!(format_money(123_456_789, "$"), "$1,234,567.89");
    }
}
