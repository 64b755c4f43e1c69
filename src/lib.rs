//! stockflow - offline-first sales and restock queue
//!
//! This crate lets a point-of-sale device accept sales and restocks while the
//! shared inventory is unreachable, persist them locally and replay them in
//! order once connectivity returns, without double-applying effects.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod remote;
pub mod storage;
pub mod sync;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::StockflowError;
pub use remote::{HttpInventory, InventoryRemote, MemoryInventory, RemoteError};
pub use sync::{ActionGateway, ActionQueue, QueueInspector, ReconcileEngine, SyncReport};
