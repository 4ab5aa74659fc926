//! Audio file metadata extraction.
//!
//! Uses the lofty crate for format-independent tag access. Produces one
//! [`ScanResult`] per importable file:
//!
//! - **Local files**: tags, duration, embedded cover and lyrics read from
//!   disk; tag text goes through [`encoding::fix_encoding`]
//! - **`.strm` pointers**: the target URL becomes the catalog path and tags
//!   are probed remotely, falling back to the file name
//! - **Audiobooks**: the album is always the containing folder's name
//!
//! A local file lofty cannot parse yields None; the caller skips it.

pub mod encoding;
pub mod remote;

use chrono::{DateTime, Utc};
use lofty::file::{AudioFile, TaggedFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cover::{self, CoverCache, EmbeddedCover};
use crate::model::MediaType;
use crate::scanner::is_strm;
use encoding::{fix_encoding, is_garbled};
use remote::RangeFetch;

/// Tag fields as read from a file, before any fallback is applied.
#[derive(Debug, Clone, Default)]
pub struct TagSnapshot {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<u32>,
    pub track: Option<u32>,
    /// Seconds
    pub duration: f64,
    pub lyrics: Option<String>,
    pub cover: Option<EmbeddedCover>,
}

impl TagSnapshot {
    pub fn from_tagged_file(file: &TaggedFile) -> Self {
        // Get the primary tag, or fall back to the first available tag
        let tag = file.primary_tag().or_else(|| file.first_tag());

        let lyrics = file.tags().iter().find_map(|t| {
            t.get_string(&ItemKey::Lyrics)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });

        Self {
            title: tag.and_then(|t| non_empty(t.title())),
            artist: tag.and_then(|t| non_empty(t.artist())),
            album: tag.and_then(|t| non_empty(t.album())),
            year: tag.and_then(|t| t.year()),
            track: tag.and_then(|t| t.track()),
            duration: file.properties().duration().as_secs_f64(),
            lyrics,
            cover: cover::first_picture(tag.into_iter().chain(file.tags())),
        }
    }
}

/// Everything the reconciler needs to know about one scanned file.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult {
    /// Local file path, or the remote URL for `.strm` and WebDAV items
    pub path: String,
    /// The file that was scanned (local path or remote path)
    pub original_path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<u32>,
    pub track_no: Option<u32>,
    /// Seconds
    pub duration: f64,
    /// Cached cover file
    pub cover_path: Option<PathBuf>,
    pub lyrics: Option<String>,
}

impl ScanResult {
    /// Whether the item streams from a remote URL.
    pub fn is_remote(&self) -> bool {
        self.path.starts_with("http")
    }

    /// Minimal result for a file whose tags could not be read.
    pub fn with_defaults(path: String, original_path: PathBuf) -> Self {
        let title = file_stem(&original_path);
        Self {
            path,
            original_path,
            size: 0,
            modified: None,
            title,
            artist: None,
            album: None,
            year: None,
            track_no: None,
            duration: 0.0,
            cover_path: None,
            lyrics: None,
        }
    }

    /// Overlay remotely probed tags. Remote text is taken as-is.
    pub fn apply_remote(&mut self, tags: TagSnapshot) {
        if let Some(title) = tags.title {
            self.title = title;
        }
        if tags.artist.is_some() {
            self.artist = tags.artist;
        }
        if tags.album.is_some() {
            self.album = tags.album;
        }
        if tags.duration > 0.0 {
            self.duration = tags.duration;
        }
    }
}

/// Reads [`ScanResult`]s from local and `.strm` files.
#[derive(Clone)]
pub struct Extractor {
    covers: CoverCache,
    fetcher: Arc<dyn RangeFetch>,
    strm_base: Option<String>,
}

impl Extractor {
    pub fn new(covers: CoverCache, fetcher: Arc<dyn RangeFetch>, strm_base: Option<String>) -> Self {
        Self {
            covers,
            fetcher,
            strm_base,
        }
    }

    pub fn covers(&self) -> &CoverCache {
        &self.covers
    }

    pub fn fetcher(&self) -> &Arc<dyn RangeFetch> {
        &self.fetcher
    }

    /// Extract one file, applying audiobook folder rules when asked.
    pub async fn parse_file(&self, path: &Path, media_type: MediaType) -> Option<ScanResult> {
        let item = if is_strm(path) {
            self.parse_strm(path).await?
        } else {
            let covers = self.covers.clone();
            let owned = path.to_path_buf();
            match tokio::task::spawn_blocking(move || parse_local(&owned, &covers)).await {
                Ok(item) => item?,
                Err(e) => {
                    tracing::warn!(target: "metadata", path = %path.display(), error = %e, "Metadata task failed");
                    return None;
                }
            }
        };

        match media_type {
            MediaType::Music => Some(item),
            MediaType::Audiobook => {
                let covers = self.covers.clone();
                tokio::task::spawn_blocking(move || apply_audiobook_rules(item, &covers))
                    .await
                    .ok()
            }
        }
    }

    async fn parse_strm(&self, path: &Path) -> Option<ScanResult> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(target: "metadata", path = %path.display(), error = %e, "Failed to read strm file");
                return None;
            }
        };
        let url = remote::resolve_strm_target(&content, self.strm_base.as_deref())?;

        let mut item = ScanResult::with_defaults(remote::normalize_url(&url), path.to_path_buf());
        if let Ok(meta) = tokio::fs::metadata(path).await {
            item.size = meta.len();
            item.modified = meta.modified().ok().map(DateTime::<Utc>::from);
        }

        if let Some(mut tags) = remote::probe_remote(self.fetcher.as_ref(), &url, None).await {
            if let Some(cover) = tags.cover.take() {
                let name = cover::strm_cover_name(&file_name(path), &cover.ext);
                item.cover_path = self.covers.store(&name, &cover);
            }
            item.apply_remote(tags);
        }

        Some(item)
    }
}

/// Read a local audio file. Blocking.
pub fn parse_local(path: &Path, covers: &CoverCache) -> Option<ScanResult> {
    let tagged = match Probe::open(path).and_then(|p| p.read()) {
        Ok(tagged) => tagged,
        Err(e) => {
            tracing::warn!(target: "metadata", path = %path.display(), error = %e, "Failed to parse media file");
            return None;
        }
    };
    let mut tags = TagSnapshot::from_tagged_file(&tagged);

    let cover_path = tags.cover.take().and_then(|cover| {
        let name = cover::local_cover_name(&file_name(path), &cover.ext);
        covers.store(&name, &cover)
    });

    let lyrics = tags
        .lyrics
        .take()
        .or_else(|| find_lyrics_file(path))
        .map(|l| l.replace('\0', ""));

    let repaired = |value: Option<String>| value.map(|v| fix_encoding(&v)).filter(|v| !v.is_empty());
    let artist = repaired(tags.artist.or_else(|| tags.album.clone()));
    let album = repaired(tags.album);
    let title = repaired(tags.title)
        .filter(|t| !is_garbled(t))
        .unwrap_or_else(|| file_stem(path));

    let meta = std::fs::metadata(path).ok();

    Some(ScanResult {
        path: path.to_string_lossy().into_owned(),
        original_path: path.to_path_buf(),
        size: meta.as_ref().map(|m| m.len()).unwrap_or(0),
        modified: meta
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from),
        title,
        artist,
        album,
        year: tags.year,
        track_no: tags.track,
        duration: tags.duration,
        cover_path,
        lyrics,
    })
}

/// Audiobooks are grouped by folder regardless of their tags. Blocking.
fn apply_audiobook_rules(mut item: ScanResult, covers: &CoverCache) -> ScanResult {
    let Some(parent) = item.original_path.parent().map(Path::to_path_buf) else {
        return item;
    };
    let folder_name = parent
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    item.album = Some(folder_name.clone());
    if item.artist.is_none() {
        item.artist = Some(folder_name);
    }
    if item.cover_path.is_none() {
        item.cover_path = covers.find_cover_in_directory(&parent);
    }
    item
}

/// Sibling `<stem>.lrc`, then `<stem>.txt`.
pub fn find_lyrics_file(audio_path: &Path) -> Option<String> {
    ["lrc", "txt"].iter().find_map(|ext| {
        let candidate = audio_path.with_extension(ext);
        if candidate.is_file() {
            std::fs::read_to_string(&candidate).ok()
        } else {
            None
        }
    })
}

fn non_empty(value: Option<Cow<'_, str>>) -> Option<String> {
    value.map(|s| s.into_owned()).filter(|s| !s.is_empty())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
