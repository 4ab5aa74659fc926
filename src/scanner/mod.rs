//! Directory traversal, file classification and change watching.
//!
//! Traversal is depth-first with entries sorted by file name so repeated
//! scans of an unchanged tree visit files in the same order. Unreadable
//! entries are logged and skipped; they never end a scan.

pub mod fingerprint;
pub mod watcher;

pub use fingerprint::{fingerprint, fingerprint_async};
pub use watcher::{FileWatcher, WatchError, WatchEvent};

use futures::stream::Stream;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use walkdir::WalkDir;

/// Extensions imported from local trees (`.strm` pointer files included).
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "wav", "m4a", "mp4", "strm"];

/// Extensions imported from WebDAV trees.
pub const REMOTE_AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "wav", "m4a", "mp4"];

/// Extensions treated as folder cover images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Extensions treated as sidecar lyrics.
pub const LYRICS_EXTENSIONS: &[&str] = &["lrc", "txt"];

/// What a path is, judged by its extension alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Audio,
    Image,
    Lyrics,
    Other,
}

/// Lowercased extension of a path, if any.
pub fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Classify a path by extension (case-insensitive).
pub fn classify(path: &Path) -> FileKind {
    match extension_lower(path) {
        Some(ext) if AUDIO_EXTENSIONS.contains(&ext.as_str()) => FileKind::Audio,
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext.as_str()) => FileKind::Image,
        Some(ext) if LYRICS_EXTENSIONS.contains(&ext.as_str()) => FileKind::Lyrics,
        _ => FileKind::Other,
    }
}

/// Check if a path has an importable audio extension.
pub fn is_audio_file(path: &Path) -> bool {
    classify(path) == FileKind::Audio
}

/// Check if a remote file name has an importable audio extension.
pub fn is_remote_audio_name(name: &str) -> bool {
    extension_lower(Path::new(name))
        .is_some_and(|ext| REMOTE_AUDIO_EXTENSIONS.contains(&ext.as_str()))
}

/// Check if a path is a `.strm` pointer file.
pub fn is_strm(path: &Path) -> bool {
    extension_lower(path).as_deref() == Some("strm")
}

/// Scans the given root directory recursively for audio files.
///
/// Returns a Stream of PathBufs in depth-first, name-sorted order. A
/// missing root yields an empty stream.
pub fn scan(root: PathBuf) -> impl Stream<Item = PathBuf> {
    let (tx, rx) = mpsc::channel(100);

    // Spawn a blocking task to perform the synchronous file system traversal
    tokio::task::spawn_blocking(move || {
        if !root.exists() {
            tracing::info!(target: "scanner", root = %root.display(), "Root does not exist, nothing to scan");
            return;
        }

        for entry in walk(&root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(target: "scanner", error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            if entry.file_type().is_file() && is_audio_file(entry.path()) {
                // If the receiver is dropped, stop scanning.
                if tx.blocking_send(entry.into_path()).is_err() {
                    break;
                }
            }
        }
    });

    // Convert the mpsc Receiver into a Stream
    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|path| (path, rx))
    })
}

/// Count importable audio files under a root.
///
/// A missing root counts as empty. A root that exists but cannot be read
/// is an error; unreadable entries below it are skipped.
pub fn count_media_files(root: &Path) -> std::io::Result<usize> {
    if !root.exists() {
        return Ok(0);
    }

    let mut count = 0;
    for entry in walk(root) {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && is_audio_file(entry.path()) {
                    count += 1;
                }
            }
            Err(e) if e.depth() == 0 => {
                let message = e.to_string();
                return Err(e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other(message)));
            }
            Err(e) => {
                tracing::warn!(target: "scanner", error = %e, "Skipping unreadable entry");
            }
        }
    }

    Ok(count)
}

fn walk(root: &Path) -> walkdir::IntoIter {
    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::fs::File;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_scan_audio_files() {
        let dir = tempdir().unwrap();
        let root = dir.path();

        File::create(root.join("song.mp3")).unwrap();
        File::create(root.join("music.flac")).unwrap();
        File::create(root.join("remote.strm")).unwrap();
        File::create(root.join("video.mp4")).unwrap();
        File::create(root.join("notes.txt")).unwrap(); // Should be ignored
        File::create(root.join("image.png")).unwrap(); // Should be ignored
        File::create(root.join("UPPERCASE.OGG")).unwrap(); // Case-insensitive

        let subdir = root.join("subdir");
        std::fs::create_dir(&subdir).unwrap();
        File::create(subdir.join("track.wav")).unwrap();
        File::create(subdir.join("ignore.doc")).unwrap();

        let paths: Vec<PathBuf> = scan(root.to_path_buf()).collect().await;
        let file_names: Vec<String> = paths
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(|s| s.to_string()))
            .collect();

        assert_eq!(paths.len(), 6);
        assert!(file_names.contains(&"remote.strm".to_string()));
        assert!(file_names.contains(&"video.mp4".to_string()));
        assert!(file_names.contains(&"UPPERCASE.OGG".to_string()));
        assert!(file_names.contains(&"track.wav".to_string()));
        assert!(!file_names.contains(&"notes.txt".to_string()));
        assert!(!file_names.contains(&"image.png".to_string()));

        assert_eq!(count_media_files(root).unwrap(), 6);
    }

    #[tokio::test]
    async fn test_scan_order_is_deterministic() {
        let dir = tempdir().unwrap();
        for name in ["c.mp3", "a.mp3", "b.mp3"] {
            File::create(dir.path().join(name)).unwrap();
        }

        let first: Vec<PathBuf> = scan(dir.path().to_path_buf()).collect().await;
        let second: Vec<PathBuf> = scan(dir.path().to_path_buf()).collect().await;
        assert_eq!(first, second);
        assert!(first[0].ends_with("a.mp3"));
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");

        let paths: Vec<PathBuf> = scan(missing.clone()).collect().await;
        assert!(paths.is_empty());
        assert_eq!(count_media_files(&missing).unwrap(), 0);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(Path::new("a/Song.MP3")), FileKind::Audio);
        assert_eq!(classify(Path::new("a/x.strm")), FileKind::Audio);
        assert_eq!(classify(Path::new("a/cover.JPEG")), FileKind::Image);
        assert_eq!(classify(Path::new("a/cover.webp")), FileKind::Image);
        assert_eq!(classify(Path::new("a/song.lrc")), FileKind::Lyrics);
        assert_eq!(classify(Path::new("a/song.txt")), FileKind::Lyrics);
        assert_eq!(classify(Path::new("a/readme")), FileKind::Other);
        assert!(is_strm(Path::new("x.STRM")));
    }

    #[test]
    fn test_remote_names_exclude_strm() {
        assert!(is_remote_audio_name("/dav/a.flac"));
        assert!(!is_remote_audio_name("/dav/a.strm"));
        assert!(!is_remote_audio_name("/dav/folder"));
    }
}
