//! Test utilities and fixtures for soundshelf tests.
//!
//! Provides a scratch database, a tiny WAV writer (lofty can read it, so
//! it exercises the real extraction path), a canned remote fetcher and a
//! ready-made [`Library`] over temporary roots.
//!
//! # Example
//!
//! ```ignore
//! use soundshelf::test_utils::TestLibrary;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let lib = TestLibrary::new().await;
//!     lib.add_music("Artist/Album/01.wav", 1);
//!     // ... test logic
//! }
//! ```

use async_trait::async_trait;
use lofty::config::WriteOptions;
use lofty::file::TaggedFileExt;
use lofty::probe::Probe;
use lofty::tag::{Tag, TagExt};
use parking_lot::Mutex;
use sqlx::sqlite::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use crate::config::WebDavConfig;
use crate::cover::CoverCache;
use crate::db::NewTrack;
use crate::library::{Library, Roots};
use crate::metadata::Extractor;
use crate::metadata::remote::{BasicAuth, RangeFetch};
use crate::model::MediaType;

/// Creates a temporary database for testing.
///
/// The database is created in a temporary directory that is automatically
/// cleaned up when the returned `TempDir` is dropped. Migrations are run
/// automatically. Keep the TempDir alive for the duration of your test.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// A bare music track row with sensible defaults.
///
/// Customize with struct update syntax:
///
/// ```ignore
/// let track = NewTrack { album_id: Some(3), ..new_track("/music/a.mp3", "h") };
/// ```
pub fn new_track(path: &str, hash: &str) -> NewTrack {
    NewTrack {
        name: "Test Track".to_string(),
        artist: "Test Artist".to_string(),
        album: "Test Album".to_string(),
        path: path.to_string(),
        duration: 180,
        file_hash: hash.to_string(),
        folder_id: None,
        file_modified_at: None,
        track_index: 0,
        episode_number: 0,
        cover: None,
        lyrics: None,
        media_type: MediaType::Music,
        artist_id: None,
        album_id: None,
    }
}

/// Write a mono 16-bit 8 kHz PCM WAV with `samples` frames.
///
/// `seed` shapes the sample data so files written with different seeds
/// get different fingerprints.
pub fn write_wav(path: &Path, samples: u32, seed: u8) {
    let data_len = samples * 2;
    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&8000u32.to_le_bytes());
    bytes.extend_from_slice(&16000u32.to_le_bytes()); // byte rate
    bytes.extend_from_slice(&2u16.to_le_bytes()); // block align
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for i in 0..samples {
        let sample = (i.wrapping_mul(u32::from(seed) + 1) % 2000) as i16 - 1000;
        bytes.extend_from_slice(&sample.to_le_bytes());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    std::fs::write(path, bytes).expect("Failed to write wav");
}

/// Edit the primary tag of an audio file in place, creating it if absent.
pub fn tag_file(path: &Path, edit: impl FnOnce(&mut Tag)) {
    let tagged = Probe::open(path)
        .expect("Failed to open file for tagging")
        .read()
        .expect("Failed to read file for tagging");

    let mut tag = tagged
        .primary_tag()
        .cloned()
        .unwrap_or_else(|| Tag::new(tagged.primary_tag_type()));
    edit(&mut tag);
    tag.save_to_path(path, WriteOptions::default())
        .expect("Failed to write tag");
}

/// [`RangeFetch`] returning a fixed body and recording every request.
#[derive(Default)]
pub struct FakeFetcher {
    body: Option<Vec<u8>>,
    pub requests: Mutex<Vec<(String, Option<BasicAuth>)>>,
}

impl FakeFetcher {
    /// Every probe fails.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every probe returns `body`.
    pub fn with_body(body: Vec<u8>) -> Self {
        Self {
            body: Some(body),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RangeFetch for FakeFetcher {
    async fn fetch_head(&self, url: &str, auth: Option<&BasicAuth>) -> Option<Vec<u8>> {
        self.requests
            .lock()
            .push((url.to_string(), auth.cloned()));
        self.body.clone()
    }
}

/// A [`Library`] over temporary music, audiobook and cover directories.
pub struct TestLibrary {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub library: Arc<Library>,
}

impl TestLibrary {
    pub async fn new() -> Self {
        Self::with_webdav(WebDavConfig::default()).await
    }

    pub async fn with_webdav(webdav: WebDavConfig) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_url = format!("sqlite:{}", dir.path().join("test.db").display());
        let pool = crate::db::init_db(&db_url)
            .await
            .expect("Failed to initialize test database");

        let roots = Roots {
            music: dir.path().join("music"),
            audiobook: dir.path().join("audiobooks"),
            cache: dir.path().join("covers"),
        };
        std::fs::create_dir_all(&roots.music).expect("Failed to create music root");
        std::fs::create_dir_all(&roots.audiobook).expect("Failed to create audiobook root");

        let covers = CoverCache::new(&roots.cache).expect("Failed to create cover cache");
        let extractor = Extractor::new(covers, Arc::new(FakeFetcher::empty()), None);
        let library = Arc::new(Library::new(pool.clone(), roots, extractor, webdav));

        Self { dir, pool, library }
    }

    pub fn music_root(&self) -> PathBuf {
        self.library.roots().music.clone()
    }

    pub fn audiobook_root(&self) -> PathBuf {
        self.library.roots().audiobook.clone()
    }

    /// Write a one-second WAV under the music root.
    pub fn add_music(&self, relative: &str, seed: u8) -> PathBuf {
        let path = self.music_root().join(relative);
        write_wav(&path, 8000, seed);
        path
    }

    /// Write a one-second WAV under the audiobook root.
    pub fn add_audiobook(&self, relative: &str, seed: u8) -> PathBuf {
        let path = self.audiobook_root().join(relative);
        write_wav(&path, 8000, seed);
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_db_creates_working_database() {
        let (pool, _dir) = temp_db().await;

        // Should be able to query
        let tracks = crate::db::get_all_tracks(&pool).await.unwrap();
        assert!(tracks.is_empty());
    }

    #[test]
    fn test_wav_seeds_produce_distinct_fingerprints() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.wav");
        let b = dir.path().join("b.wav");
        write_wav(&a, 8000, 1);
        write_wav(&b, 8000, 2);
        assert_ne!(
            crate::scanner::fingerprint(&a),
            crate::scanner::fingerprint(&b)
        );
    }

    #[test]
    fn test_new_track_defaults() {
        let track = new_track("/music/song.flac", "abc");
        assert_eq!(track.path, "/music/song.flac");
        assert_eq!(track.file_hash, "abc");
        assert_eq!(track.media_type, MediaType::Music);
    }
}
