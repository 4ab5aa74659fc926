//! Import orchestration.
//!
//! A run walks INITIALIZING → PREPARING → PARSING → SUCCESS | FAILED:
//!
//! 1. **Preparing**: count local files and list WebDAV trees so progress
//!    has a total. An unreadable local root fails the run here.
//! 2. **Parsing**: local music, local audiobooks, WebDAV music, WebDAV
//!    audiobooks, in that order. A file that fails is logged and counted;
//!    it never fails the run.
//! 3. **Sweep** (full mode): trash every ACTIVE track the run did not see.
//!
//! A run holds the catalog lock from start to finish, so watcher events
//! and other runs wait for it. On success the watcher is reinstalled.

use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::task::{
    ImportMode, ImportTask, MSG_COMPACTING, MSG_COUNTING_LOCAL, MSG_COUNTING_WEBDAV_AUDIOBOOK,
    MSG_COUNTING_WEBDAV_MUSIC, MSG_DONE, MSG_PARSING, MSG_SWEEPING, TaskRegistry, TaskStatus,
};
use crate::config::WatcherConfig;
use crate::db;
use crate::error::{Result, ResultExt};
use crate::library::{Library, Source, WatchHandle, maintenance, spawn_watcher, sweep_orphans};
use crate::metadata::ScanResult;
use crate::model::MediaType;
use crate::scanner::{self, count_media_files};
use crate::webdav::{RemoteEntry, WebDavSource};

/// Which sources a run scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sources {
    All,
    WebDavOnly,
}

/// Creates import tasks, runs them in the background and owns the
/// filesystem watcher.
#[derive(Clone)]
pub struct ImportService {
    library: Arc<Library>,
    tasks: Arc<TaskRegistry>,
    watcher_config: WatcherConfig,
    watcher: Arc<Mutex<Option<WatchHandle>>>,
}

impl ImportService {
    pub fn new(library: Arc<Library>, watcher_config: WatcherConfig) -> Self {
        Self {
            library,
            tasks: Arc::new(TaskRegistry::new()),
            watcher_config,
            watcher: Arc::new(Mutex::new(None)),
        }
    }

    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }

    /// Start an import in the background and return its task id.
    pub fn create_task(&self, mode: ImportMode) -> String {
        self.spawn_task(mode, Sources::All)
    }

    pub fn get_task(&self, id: &str) -> Option<ImportTask> {
        self.tasks.get(id)
    }

    /// The oldest task that has not finished.
    pub fn get_running_task(&self) -> Option<ImportTask> {
        self.tasks.running()
    }

    /// Poll a task until it finishes, reporting each snapshot.
    pub async fn wait(&self, id: &str, mut on_progress: impl FnMut(&ImportTask)) -> Option<ImportTask> {
        loop {
            let task = self.tasks.get(id)?;
            on_progress(&task);
            if task.status.is_terminal() {
                return Some(task);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Start-up housekeeping: recalibrate episode numbers and backfill
    /// fingerprints, then import from WebDAV if the catalog is empty.
    ///
    /// Returns the id of the WebDAV task, if one was started.
    pub async fn bootstrap(&self) -> Result<Option<String>> {
        {
            let _guard = self.library.lock_catalog().await;
            if let Err(e) = maintenance::recalibrate_indices(self.library.pool()).await {
                tracing::error!(target: "import", error = %e, "Failed to recalibrate episode numbers");
            }
            if let Err(e) = maintenance::backfill_hashes(&self.library).await {
                tracing::error!(target: "import", error = %e, "Failed to backfill fingerprints");
            }
        }

        let empty = db::count_tracks(self.library.pool()).await? == 0;
        if empty && self.library.webdav_config().is_configured() {
            tracing::info!(target: "import", "Catalog is empty, starting initial WebDAV import");
            return Ok(Some(self.spawn_task(ImportMode::Incremental, Sources::WebDavOnly)));
        }
        Ok(None)
    }

    /// Install (or replace) the watcher over the library roots.
    pub fn install_watcher(&self) -> Result<()> {
        let handle = spawn_watcher(Arc::clone(&self.library), &self.watcher_config)?;
        // The previous handle finishes its queued events in the background
        *self.watcher.lock() = Some(handle);
        Ok(())
    }

    pub fn watcher_installed(&self) -> bool {
        self.watcher.lock().is_some()
    }

    fn spawn_task(&self, mode: ImportMode, sources: Sources) -> String {
        let id = Uuid::new_v4().to_string();
        self.tasks.insert(ImportTask::new(id.clone(), mode));
        tracing::info!(target: "import", task_id = %id, ?mode, "Import task created");

        let service = self.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            service.run(&task_id, mode, sources).await;
        });

        id
    }

    async fn run(&self, id: &str, mode: ImportMode, sources: Sources) {
        let library = Arc::clone(&self.library);
        let guard = library.lock_catalog().await;

        let result = match mode {
            ImportMode::Compact => self.compact(id).await,
            ImportMode::Incremental | ImportMode::Full => self.import(id, mode, sources).await,
        };
        drop(guard);

        match result {
            Ok(()) => {
                // Pollers that see SUCCESS can rely on the watcher being up
                if mode != ImportMode::Compact
                    && self.watcher_config.enabled
                    && let Err(e) = self.install_watcher()
                {
                    tracing::warn!(target: "import", error = %e, "Failed to install file watcher");
                }

                self.tasks.update(id, |t| {
                    t.status = TaskStatus::Success;
                    t.message = Some(MSG_DONE.to_string());
                });
                tracing::info!(target: "import", task_id = id, "Import finished");
            }
            Err(e) => {
                tracing::error!(target: "import", task_id = id, error = %e, "Import failed");
                self.tasks.update(id, |t| {
                    t.status = TaskStatus::Failed;
                    t.message = Some(e.to_string());
                });
            }
        }
    }

    async fn import(&self, id: &str, mode: ImportMode, sources: Sources) -> Result<()> {
        let library = &self.library;

        // Preparing
        self.set_phase(id, TaskStatus::Preparing, MSG_COUNTING_LOCAL);
        let local_total = match sources {
            Sources::All => {
                count_local(&library.roots().music).await?
                    + count_local(&library.roots().audiobook).await?
            }
            Sources::WebDavOnly => 0,
        };

        let mut remote: Vec<(MediaType, WebDavSource, Vec<RemoteEntry>)> = Vec::new();
        for (media_type, message) in [
            (MediaType::Music, MSG_COUNTING_WEBDAV_MUSIC),
            (MediaType::Audiobook, MSG_COUNTING_WEBDAV_AUDIOBOOK),
        ] {
            if let Some(source) = library.webdav_source(media_type) {
                self.tasks.update(id, |t| t.message = Some(message.to_string()));
                let source = source?;
                let entries = source.walk().await;
                remote.push((media_type, source, entries));
            }
        }
        let webdav_total: usize = remote.iter().map(|(_, _, entries)| entries.len()).sum();

        // Parsing
        self.tasks.update(id, |t| {
            t.status = TaskStatus::Parsing;
            t.message = Some(MSG_PARSING.to_string());
            t.local_total = local_total;
            t.webdav_total = webdav_total;
            t.total = local_total + webdav_total;
            t.local_current = 0;
            t.webdav_current = 0;
            t.current = 0;
        });
        tracing::info!(target: "import", task_id = id, local_total, webdav_total, "Parsing media files");

        let mut processed = HashSet::new();
        if sources == Sources::All {
            self.scan_local(id, MediaType::Music, &mut processed).await;
            self.scan_local(id, MediaType::Audiobook, &mut processed).await;
        }
        for (media_type, source, entries) in &remote {
            self.scan_webdav(id, *media_type, source, entries, &mut processed)
                .await;
        }

        if mode == ImportMode::Full {
            self.tasks.update(id, |t| t.message = Some(MSG_SWEEPING.to_string()));
            sweep_orphans(library.pool(), &processed).await?;
        }

        Ok(())
    }

    async fn scan_local(&self, id: &str, media_type: MediaType, processed: &mut HashSet<i64>) {
        let library = &self.library;
        let root = library.roots().root(media_type).to_path_buf();
        let mut paths = std::pin::pin!(scanner::scan(root));

        while let Some(path) = paths.next().await {
            match library.extractor().parse_file(&path, media_type).await {
                Some(item) => {
                    self.tasks
                        .update(id, |t| t.current_file_name = Some(display_name(&item)));
                    self.process(&item, media_type, Source::Local, processed).await;
                }
                None => {
                    tracing::debug!(target: "import", path = %path.display(), "Skipped unreadable file");
                }
            }
            self.tasks.update(id, |t| {
                t.local_current += 1;
                t.current += 1;
            });
        }
    }

    async fn scan_webdav(
        &self,
        id: &str,
        media_type: MediaType,
        source: &WebDavSource,
        entries: &[RemoteEntry],
        processed: &mut HashSet<i64>,
    ) {
        tracing::info!(target: "import", base = %source.base(), ?media_type, "Scanning WebDAV source");
        for entry in entries {
            let item = source.parse_entry(entry).await;
            self.tasks
                .update(id, |t| t.current_file_name = Some(display_name(&item)));
            self.process(&item, media_type, Source::WebDav, processed).await;
            self.tasks.update(id, |t| {
                t.webdav_current += 1;
                t.current += 1;
            });
        }
    }

    async fn process(
        &self,
        item: &ScanResult,
        media_type: MediaType,
        source: Source,
        processed: &mut HashSet<i64>,
    ) {
        match self.library.process_item(item, media_type, source).await {
            Ok(reconciled) => {
                processed.insert(reconciled.track_id);
            }
            Err(e) => {
                tracing::warn!(target: "import", path = %item.original_path.display(), error = %e, "Failed to import item");
            }
        }
    }

    async fn compact(&self, id: &str) -> Result<()> {
        self.set_phase(id, TaskStatus::Preparing, MSG_COUNTING_LOCAL);
        let total = db::get_active_tracks(self.library.pool()).await?.len();

        self.tasks.update(id, |t| {
            t.status = TaskStatus::Parsing;
            t.message = Some(MSG_COMPACTING.to_string());
            t.total = total;
            t.local_total = total;
        });
        let report = maintenance::run_all(&self.library).await?;
        tracing::info!(target: "import", task_id = id, ?report, "Catalog compacted");

        self.tasks.update(id, |t| {
            t.current = total;
            t.local_current = total;
        });
        Ok(())
    }

    fn set_phase(&self, id: &str, status: TaskStatus, message: &str) {
        self.tasks.update(id, |t| {
            t.status = status;
            t.message = Some(message.to_string());
        });
    }
}

/// Count audio files under a local root off the executor.
async fn count_local(root: &Path) -> Result<usize> {
    let owned = root.to_path_buf();
    tokio::task::spawn_blocking(move || count_media_files(&owned))
        .await?
        .with_context(format!("Failed to read library root {}", root.display()))
}

fn display_name(item: &ScanResult) -> String {
    if item.title.is_empty() {
        item.original_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        item.title.clone()
    }
}
