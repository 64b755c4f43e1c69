use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::sync::{ActionId, ActionState, Actor, SaleLine};

#[derive(Parser)]
#[command(name = "stockflow")]
#[command(about = "Offline-first sales and restock queue for a retail inventory")]
#[command(long_about = "stockflow - offline-first point-of-sale queue

Records sales and restocks against a shared inventory. When the inventory
service is unreachable, actions are stored locally and replayed in order
once the connection comes back. Sales that no longer fit the available
stock are skipped and reported instead of being applied.

QUICK START:
  stockflow sale --item p1:2:12.50:Milk --actor-id u1
  stockflow restock p1 --quantity 10 --actor-id u1
  stockflow queue status        Show what is waiting to sync
  stockflow queue sync          Sync now
  stockflow watch               Sync automatically when back online

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    ///
    /// Defaults to `general.default_output` from the config file.
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    /// Data directory holding config.yaml and queue.db
    #[arg(long, env = "STOCKFLOW_HOME", global = true)]
    pub home: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Record a sale
    ///
    /// Applies the sale right away when the inventory is reachable;
    /// otherwise it is queued and synced later.
    ///
    /// # Examples
    ///
    ///   stockflow sale --item p1:2:12.50:Milk --item p2:1:10:Bread --actor-id u1
    ///   stockflow sale -i p1:1:3.99 --actor-id u1 --actor-email clerk@shop.example
    #[command(alias = "s")]
    Sale(SaleArgs),

    /// Add stock to a product
    ///
    /// # Examples
    ///
    ///   stockflow restock p1 --quantity 10 --name Milk --actor-id u1
    #[command(alias = "r")]
    Restock(RestockArgs),

    /// Inspect and manage the offline queue
    #[command(alias = "q")]
    Queue(QueueArgs),

    /// Sync automatically whenever the inventory becomes reachable
    ///
    /// Probes the inventory periodically and drains the queue on every
    /// offline to online transition. Runs until interrupted with Ctrl-C.
    Watch,

    /// Show configuration
    Config(ConfigArgs),
}

/// Identity of the person performing an action.
#[derive(Args, Clone, Debug)]
pub struct ActorArgs {
    /// User id of the attendant or stock clerk
    #[arg(long = "actor-id", env = "STOCKFLOW_ACTOR_ID")]
    pub id: String,

    /// Email of the attendant or stock clerk
    #[arg(long = "actor-email", env = "STOCKFLOW_ACTOR_EMAIL", default_value = "")]
    pub email: String,
}

impl From<ActorArgs> for Actor {
    fn from(args: ActorArgs) -> Self {
        Self::new(args.id, args.email)
    }
}

/// Arguments for a sale.
#[derive(Args)]
pub struct SaleArgs {
    /// Line item as PRODUCT_ID:QUANTITY:UNIT_PRICE[:NAME] (repeatable)
    #[arg(short, long = "item", required = true, value_parser = parse_sale_line)]
    pub items: Vec<SaleLine>,

    #[command(flatten)]
    pub actor: ActorArgs,
}

/// Arguments for a restock.
#[derive(Args)]
pub struct RestockArgs {
    /// Product id
    pub product_id: String,

    /// Units to add
    #[arg(short, long)]
    pub quantity: u32,

    /// Product name used in descriptions (defaults to the id)
    #[arg(short, long)]
    pub name: Option<String>,

    #[command(flatten)]
    pub actor: ActorArgs,
}

/// Arguments for queue management.
#[derive(Args)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub command: QueueCommands,
}

/// Queue subcommands.
#[derive(Subcommand)]
pub enum QueueCommands {
    /// Show queue counts
    Status,

    /// List queued actions in the order they will sync
    List {
        /// Only show actions in this state (pending, applying, failed)
        #[arg(long, short = 's')]
        state: Option<ActionState>,
    },

    /// Sync queued actions now
    ///
    /// Use when the connection is back but no automatic sync happened.
    Sync,

    /// Delete every queued action
    ///
    /// Unsynced sales and restocks are lost. Requires --force.
    Purge {
        /// Confirm the purge
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Requeue failed actions
    Retry {
        /// Action id to requeue
        id: Option<ActionId>,

        /// Requeue every failed action
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },
}

/// Arguments for config commands.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Print the config file location
    Path,
}

/// Parse `PRODUCT_ID:QUANTITY:UNIT_PRICE[:NAME]`.
fn parse_sale_line(value: &str) -> Result<SaleLine, String> {
    let mut parts = value.splitn(4, ':');
    let product_id = parts.next().unwrap_or_default().trim();
    let quantity = parts.next().ok_or("missing quantity")?.trim();
    let price = parts.next().ok_or("missing unit price")?.trim();
    let name = parts.next().map(str::trim).filter(|n| !n.is_empty());

    if product_id.is_empty() {
        return Err("missing product id".to_string());
    }
    let quantity: u32 = quantity
        .parse()
        .map_err(|_| format!("invalid quantity '{quantity}'"))?;

    Ok(SaleLine {
        product_id: product_id.to_string(),
        product_name: name.unwrap_or(product_id).to_string(),
        quantity,
        unit_price_cents: parse_cents(price)?,
    })
}

/// Parse a decimal amount such as `12`, `12.5` or `12.50` into cents.
fn parse_cents(value: &str) -> Result<u64, String> {
    let invalid = || format!("invalid price '{value}'");
    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));

    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if fraction.len() > 2 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let whole: u64 = whole.parse().map_err(|_| invalid())?;
    let cents: u64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<u64>().map_err(|_| invalid())? * 10,
        _ => fraction.parse().map_err(|_| invalid())?,
    };

    whole
        .checked_mul(100)
        .and_then(|c| c.checked_add(cents))
        .ok_or_else(invalid)
}
