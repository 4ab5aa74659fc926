//! Command-line interface for soundshelf.
//!
//! Runs imports, keeps the catalog in sync with a watcher, and inspects
//! or repairs the catalog.

mod commands;

pub use commands::{Cli, Commands, run_command};
