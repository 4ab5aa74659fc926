//! Long-running mode: bootstrap, then watch the library roots.

use tokio::runtime::Runtime;
use tracing::info;

use super::import::print_progress;
use super::open_library;
use crate::config::Config;
use crate::import::{ImportMode, ImportService};

/// Bootstrap the catalog, install the watcher and run until Ctrl+C.
pub fn cmd_watch(rt: &Runtime, config: &Config, scan_first: bool) -> anyhow::Result<()> {
    rt.block_on(async {
        let library = open_library(config).await?;
        let service = ImportService::new(library, config.watcher.clone());

        if let Some(id) = service.bootstrap().await? {
            println!("Catalog is empty, importing from WebDAV...");
            service.wait(&id, print_progress).await;
            println!();
        }

        if scan_first {
            let id = service.create_task(ImportMode::Incremental);
            service.wait(&id, print_progress).await;
            println!();
        }

        // A successful import already installed it
        if !service.watcher_installed() {
            service.install_watcher()?;
        }

        let roots = service.library().roots();
        info!(
            target: "library::watch",
            music = %roots.music.display(),
            audiobooks = %roots.audiobook.display(),
            "Watching library roots"
        );
        println!("Watching for changes. Press Ctrl+C to stop.");

        tokio::signal::ctrl_c().await?;
        println!("\nStopping watcher...");
        Ok(())
    })
}
