//! Soundshelf - a music and audiobook catalog that stays in sync with its
//! sources.
//!
//! Local folders (including `.strm` stream pointers) and WebDAV shares are
//! imported into a SQLite catalog of artists, albums, folders and tracks.
//! A file watcher keeps the catalog current between imports.

pub mod cli;
pub mod config;
pub mod cover;
pub mod db;
pub mod error;
pub mod import;
pub mod library;
pub mod metadata;
pub mod model;
pub mod scanner;
#[cfg(test)]
pub mod test_utils;
pub mod webdav;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging. Modules log under their own short targets.
    let mut filter = EnvFilter::from_default_env();
    for target in ["soundshelf", "import", "library", "scanner", "metadata", "cover", "webdav"] {
        filter = filter.add_directive(format!("{target}=info").parse()?);
    }
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    cli::run_command(&args)
}
