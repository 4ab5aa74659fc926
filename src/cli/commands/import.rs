//! One-shot import with progress output.

use std::io::Write;
use tokio::runtime::Runtime;

use super::open_library;
use crate::config::{Config, WatcherConfig};
use crate::import::{ImportMode, ImportService, ImportTask, TaskStatus};

/// Run an import to completion, printing progress on one line.
pub fn cmd_import(rt: &Runtime, config: &Config, mode: ImportMode) -> anyhow::Result<()> {
    rt.block_on(async {
        let library = open_library(config).await?;
        // A one-shot run has nobody to keep a watcher alive for
        let watcher = WatcherConfig {
            enabled: false,
            ..config.watcher.clone()
        };
        let service = ImportService::new(library, watcher);

        let id = service.create_task(mode);
        let task = service
            .wait(&id, print_progress)
            .await
            .ok_or_else(|| anyhow::anyhow!("Import task {id} disappeared"))?;
        println!();

        match task.status {
            TaskStatus::Success => {
                println!(
                    "Import finished: {} local, {} WebDAV files",
                    task.local_current, task.webdav_current
                );
                Ok(())
            }
            _ => anyhow::bail!(
                "Import failed: {}",
                task.message.as_deref().unwrap_or("unknown error")
            ),
        }
    })
}

pub(super) fn print_progress(task: &ImportTask) {
    let message = task.message.as_deref().unwrap_or("");
    let file = task.current_file_name.as_deref().unwrap_or("");
    print!("\r[{}/{}] {} {}\x1b[K", task.current, task.total, message, file);
    let _ = std::io::stdout().flush();
}
