//! File system watcher for live library changes.
//!
//! Uses a polling backend (not native OS events) so network mounts and
//! virtual filesystems behave the same as local disks, and coalesces
//! bursts of events with a stability window before anything is reported.
//!
//! # Design
//!
//! - **Polling**: [`PollWatcher`] with a configurable interval (1 s default)
//! - **Debounced events**: a file is reported once it has been quiet for the
//!   stability window (2 s default)
//! - **Relevant files only**: audio, cover images and lyrics sidecars
//! - **Graceful shutdown**: dropping the [`FileWatcher`] stops polling
//!
//! # Usage
//!
//! ```rust,ignore
//! let (watcher, rx) = FileWatcher::new(vec!["/music".into()], poll, stability)?;
//!
//! while let Ok(event) = rx.recv() {
//!     match event {
//!         WatchEvent::Added(path) => println!("New file: {:?}", path),
//!         WatchEvent::Changed(path) => println!("Changed: {:?}", path),
//!         WatchEvent::Removed(path) => println!("Deleted: {:?}", path),
//!         WatchEvent::Error(e) => eprintln!("{e}"),
//!     }
//! }
//! ```

use crossbeam_channel::{Receiver, Sender, bounded};
use notify::{EventKind, PollWatcher, RecursiveMode, event::ModifyKind};
use notify_debouncer_full::{DebounceEventResult, Debouncer, FileIdMap, new_debouncer_opt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::{FileKind, classify};

/// Events emitted by the file watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A relevant file appeared
    Added(PathBuf),
    /// A relevant file's content or metadata changed
    Changed(PathBuf),
    /// A relevant file disappeared
    Removed(PathBuf),
    /// An error occurred while watching
    Error(String),
}

impl WatchEvent {
    pub fn path(&self) -> Option<&Path> {
        match self {
            WatchEvent::Added(p) | WatchEvent::Changed(p) | WatchEvent::Removed(p) => Some(p),
            WatchEvent::Error(_) => None,
        }
    }
}

/// Handle to a running file watcher.
///
/// Dropping this handle will stop the watcher.
pub struct FileWatcher {
    debouncer: Debouncer<PollWatcher, FileIdMap>,
    running: Arc<AtomicBool>,
    roots: Vec<PathBuf>,
}

impl FileWatcher {
    /// Create a polling watcher over the given directories.
    ///
    /// Returns the watcher handle and a receiver for watch events.
    pub fn new(
        watch_paths: Vec<PathBuf>,
        poll_interval: Duration,
        stability: Duration,
    ) -> Result<(Self, Receiver<WatchEvent>), WatchError> {
        let (tx, rx) = bounded(1024);
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);

        let config = notify::Config::default().with_poll_interval(poll_interval);

        let debouncer = new_debouncer_opt::<_, PollWatcher, FileIdMap>(
            stability,
            None,
            move |result: DebounceEventResult| {
                if !running_clone.load(Ordering::Relaxed) {
                    return;
                }
                Self::handle_debounced_events(result, &tx);
            },
            FileIdMap::new(),
            config,
        )
        .map_err(|e| WatchError::Init(e.to_string()))?;

        let mut watcher = Self {
            debouncer,
            running,
            roots: Vec::new(),
        };

        for path in watch_paths {
            watcher.watch(&path)?;
        }

        Ok((watcher, rx))
    }

    /// Add a directory to watch.
    pub fn watch(&mut self, path: &Path) -> Result<(), WatchError> {
        tracing::info!(target: "scanner::watcher", path = %path.display(), "Watching directory");
        self.debouncer
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| WatchError::Watch(e.to_string()))?;
        self.roots.push(path.to_path_buf());
        Ok(())
    }

    /// Directories currently being watched.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Handle debounced events from notify.
    fn handle_debounced_events(result: DebounceEventResult, tx: &Sender<WatchEvent>) {
        match result {
            Ok(events) => {
                for event in events {
                    for path in &event.paths {
                        if let Some(evt) = translate(&event.kind, path) {
                            tracing::debug!(target: "scanner::watcher", event = ?evt, "File event");
                            if tx.try_send(evt).is_err() {
                                tracing::warn!(target: "scanner::watcher", path = %path.display(), "Event queue full, dropping event");
                            }
                        }
                    }
                }
            }
            Err(errors) => {
                for error in errors {
                    tracing::warn!(target: "scanner::watcher", error = %error, "Watch error");
                    let _ = tx.try_send(WatchEvent::Error(error.to_string()));
                }
            }
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        tracing::debug!(target: "scanner::watcher", "File watcher stopped");
    }
}

/// Map a raw notify event on one path to a [`WatchEvent`].
///
/// Directories and irrelevant extensions are dropped. Removed paths can no
/// longer be inspected, so they are judged by extension alone.
fn translate(kind: &EventKind, path: &Path) -> Option<WatchEvent> {
    if classify(path) == FileKind::Other {
        return None;
    }

    match kind {
        EventKind::Create(_) if path.is_file() => Some(WatchEvent::Added(path.to_path_buf())),
        // Renames arrive as name changes on backends that track them
        EventKind::Modify(ModifyKind::Name(_)) => {
            if path.is_file() {
                Some(WatchEvent::Added(path.to_path_buf()))
            } else {
                Some(WatchEvent::Removed(path.to_path_buf()))
            }
        }
        EventKind::Modify(_) if path.is_file() => Some(WatchEvent::Changed(path.to_path_buf())),
        EventKind::Remove(_) => Some(WatchEvent::Removed(path.to_path_buf())),
        _ => None,
    }
}

/// Errors that can occur during file watching.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {0}")]
    Init(String),
    #[error("Failed to watch path: {0}")]
    Watch(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind, RenameMode};
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_translate_filters_by_kind() {
        let dir = tempdir().unwrap();
        let song = dir.path().join("song.mp3");
        let notes = dir.path().join("notes.doc");
        File::create(&song).unwrap();
        File::create(&notes).unwrap();

        let create = EventKind::Create(CreateKind::Any);
        assert_eq!(translate(&create, &song), Some(WatchEvent::Added(song.clone())));
        assert_eq!(translate(&create, &notes), None);

        let modify = EventKind::Modify(ModifyKind::Data(DataChange::Any));
        assert_eq!(translate(&modify, &song), Some(WatchEvent::Changed(song.clone())));

        let gone = dir.path().join("gone.flac");
        let remove = EventKind::Remove(RemoveKind::Any);
        assert_eq!(translate(&remove, &gone), Some(WatchEvent::Removed(gone.clone())));

        let rename = EventKind::Modify(ModifyKind::Name(RenameMode::Both));
        assert_eq!(translate(&rename, &gone), Some(WatchEvent::Removed(gone)));
        assert_eq!(translate(&rename, &song), Some(WatchEvent::Added(song)));
    }

    #[test]
    fn test_translate_ignores_directories() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("Album.mp3");
        std::fs::create_dir(&sub).unwrap();
        assert_eq!(translate(&EventKind::Create(CreateKind::Any), &sub), None);
    }

    #[test]
    fn test_watcher_creation() {
        let dir = tempdir().unwrap();
        let (watcher, _rx) = FileWatcher::new(
            vec![dir.path().to_path_buf()],
            Duration::from_millis(100),
            Duration::from_millis(200),
        )
        .unwrap();
        assert_eq!(watcher.roots().len(), 1);
        drop(watcher);
    }

    #[test]
    fn test_watcher_detects_new_file() {
        let dir = tempdir().unwrap();
        let (watcher, rx) = FileWatcher::new(
            vec![dir.path().to_path_buf()],
            Duration::from_millis(100),
            Duration::from_millis(200),
        )
        .unwrap();

        let file_path = dir.path().join("new_song.mp3");
        let mut file = File::create(&file_path).unwrap();
        file.write_all(b"fake mp3 content").unwrap();
        file.sync_all().unwrap();

        let event = rx.recv_timeout(Duration::from_secs(3));
        drop(watcher);

        // Polling timing varies between systems, so only check the payload
        // when an event did arrive in time.
        if let Ok(WatchEvent::Added(path)) = event {
            assert_eq!(path.file_name().unwrap(), "new_song.mp3");
        }
    }
}
