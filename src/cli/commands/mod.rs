//! CLI command definitions and dispatch.
//!
//! Each subcommand lives in its own submodule:
//! - `import`: one-shot imports with progress output
//! - `watch`: bootstrap, then keep the catalog in sync
//! - `status`: catalog counts and stream resolution
//! - `maintain`: maintenance passes
//! - `config`: write or show the configuration file

mod config;
mod import;
mod maintain;
mod status;
mod watch;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::config::Config;
use crate::db;
use crate::import::ImportMode;
use crate::library::Library;

pub use config::{cmd_config_init, cmd_config_show};
pub use import::cmd_import;
pub use maintain::cmd_maintain;
pub use status::{cmd_resolve, cmd_status};
pub use watch::cmd_watch;

/// Soundshelf CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub paths: PathArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides for the configured locations.
#[derive(Args, Default)]
pub struct PathArgs {
    /// Local music root
    #[arg(long, global = true)]
    pub music: Option<PathBuf>,
    /// Local audiobook root
    #[arg(long, global = true)]
    pub audiobooks: Option<PathBuf>,
    /// Cover cache directory
    #[arg(long, global = true)]
    pub cache: Option<PathBuf>,
    /// Catalog database file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Import the configured sources into the catalog
    Import {
        /// incremental keeps unseen tracks, full trashes them, compact only
        /// runs maintenance
        #[arg(long, value_enum, default_value_t = ImportMode::Incremental)]
        mode: ImportMode,
    },
    /// Run start-up maintenance, then watch the local roots for changes
    Watch {
        /// Run an incremental import before watching
        #[arg(long)]
        scan_first: bool,
    },
    /// Show catalog counts as JSON
    Status,
    /// Show what a player would open for a catalog path
    Resolve {
        /// Catalog path, e.g. /music/Artist/Album/01.flac
        uri: String,
    },
    /// Recalibrate episode numbers, backfill fingerprints, resync statuses
    Maintain,
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write the effective configuration to the config file
    Init,
    /// Print the effective configuration
    Show,
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let config = effective_config(&cli.paths);
    let rt = Runtime::new()?;

    match &cli.command {
        Commands::Import { mode } => cmd_import(&rt, &config, *mode),
        Commands::Watch { scan_first } => cmd_watch(&rt, &config, *scan_first),
        Commands::Status => cmd_status(&rt, &config),
        Commands::Resolve { uri } => cmd_resolve(&rt, &config, uri),
        Commands::Maintain => cmd_maintain(&rt, &config),
        Commands::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(&config),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// File values, then environment, then command-line flags.
fn effective_config(paths: &PathArgs) -> Config {
    let mut config = crate::config::load();
    apply_paths(&mut config, paths);
    config
}

fn apply_paths(config: &mut Config, paths: &PathArgs) {
    if let Some(p) = &paths.music {
        config.library.music_path = p.clone();
    }
    if let Some(p) = &paths.audiobooks {
        config.library.audiobook_path = p.clone();
    }
    if let Some(p) = &paths.cache {
        config.library.cache_path = p.clone();
    }
    if let Some(p) = &paths.db {
        config.library.database = p.clone();
    }
}

/// Open the catalog database and build the library over it.
pub(crate) async fn open_library(config: &Config) -> anyhow::Result<Arc<Library>> {
    let url = db::db_url(Some(&config.library.database));
    let pool = db::init_db(&url).await?;
    Ok(Arc::new(Library::from_config(pool, config)?))
}
