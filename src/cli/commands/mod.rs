//! Command implementations for stockflow.
//!
//! Every command returns the text to print, already formatted for the
//! selected output format.

mod actions;
mod config;
mod context;
mod queue;
mod watch;

pub use actions::{restock, sale};
pub use config::config;
pub use context::App;
pub use queue::queue;
pub use watch::watch;
