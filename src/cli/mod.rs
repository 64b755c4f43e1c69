//! Command-line interface for stockflow.

pub mod args;
pub mod commands;
