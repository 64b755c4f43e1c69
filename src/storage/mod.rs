//! Storage layer for stockflow.
//!
//! SQLite-based persistence for the offline action queue.

mod database;
mod migrations;

pub use database::Database;
