//! Cover art extraction and the on-disk cover cache.
//!
//! Covers come from two places:
//!
//! 1. **Embedded tags** - the first picture in the audio file's tags
//! 2. **Folder images** - the first image file in a track's directory
//!
//! Either way the image ends up as a plain file in the cache directory, and
//! the catalog stores `/covers/<file name>` for it. Naming depends on where
//! the picture came from so repeated imports overwrite instead of piling up.

use lofty::picture::{MimeType, Picture};
use lofty::tag::Tag;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::scanner::IMAGE_EXTENSIONS;

/// Picture bytes pulled out of a tag, with the extension to save them under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedCover {
    pub data: Vec<u8>,
    /// Subtype of the picture's MIME type (`jpeg`, `png`, ...)
    pub ext: String,
}

impl EmbeddedCover {
    pub fn from_picture(picture: &Picture) -> Self {
        Self {
            data: picture.data().to_vec(),
            ext: picture_extension(picture.mime_type()).to_string(),
        }
    }
}

/// First picture found across the given tags, in order.
pub fn first_picture<'a>(tags: impl IntoIterator<Item = &'a Tag>) -> Option<EmbeddedCover> {
    tags.into_iter()
        .find_map(|tag| tag.pictures().first())
        .map(EmbeddedCover::from_picture)
}

/// File extension for a picture, taken from the MIME subtype.
///
/// Falls back to `jpg` when the type is missing or has no subtype.
pub fn picture_extension(mime: Option<&MimeType>) -> &str {
    match mime {
        Some(MimeType::Jpeg) => "jpeg",
        Some(MimeType::Png) => "png",
        Some(MimeType::Gif) => "gif",
        Some(MimeType::Bmp) => "bmp",
        Some(MimeType::Tiff) => "tiff",
        Some(other) => other
            .as_str()
            .split('/')
            .nth(1)
            .filter(|s| !s.is_empty())
            .unwrap_or("jpg"),
        None => "jpg",
    }
}

/// Cache name for a cover embedded in a local file.
pub fn local_cover_name(file_name: &str, ext: &str) -> String {
    format!("{file_name}.{ext}")
}

/// Cache name for a cover fetched through a `.strm` target.
pub fn strm_cover_name(file_name: &str, ext: &str) -> String {
    format!("{file_name}_strm.{ext}")
}

/// Cache name for a cover fetched from a WebDAV file.
///
/// Uses the last 20 hex digits of the remote path's bytes, which keeps
/// names short while staying distinct for files in different folders.
pub fn webdav_cover_name(remote_path: &str, ext: &str) -> String {
    let hex: String = remote_path.bytes().map(|b| format!("{b:02x}")).collect();
    let tail = &hex[hex.len().saturating_sub(20)..];
    format!("{tail}_{ext}")
}

/// Cover art disk cache.
#[derive(Debug, Clone)]
pub struct CoverCache {
    cache_dir: PathBuf,
}

impl CoverCache {
    /// Open a cache in the given directory, creating it if needed.
    pub fn new(cache_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Write image bytes under `name`, replacing any previous file.
    pub fn put(&self, name: &str, data: &[u8]) -> io::Result<PathBuf> {
        let path = self.cache_dir.join(name);
        fs::write(&path, data)?;
        Ok(path)
    }

    /// Write a cover, logging instead of failing.
    ///
    /// A cover that cannot be cached never blocks importing the track.
    pub fn store(&self, name: &str, cover: &EmbeddedCover) -> Option<PathBuf> {
        match self.put(name, &cover.data) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(target: "cover", name, error = %e, "Failed to cache cover");
                None
            }
        }
    }

    /// Copy the first image file in `dir` into the cache.
    ///
    /// Entries are examined in name order. The copy is named
    /// `<directory name>_cover.<ext>` with the extension lowercased.
    pub fn find_cover_in_directory(&self, dir: &Path) -> Option<PathBuf> {
        let image = match first_image_in(dir) {
            Ok(image) => image?,
            Err(e) => {
                tracing::warn!(target: "cover", dir = %dir.display(), error = %e, "Failed to look for folder cover");
                return None;
            }
        };

        let dir_name = dir.file_name()?.to_string_lossy();
        let ext = crate::scanner::extension_lower(&image)?;
        let target = self.cache_dir.join(format!("{dir_name}_cover.{ext}"));

        match fs::copy(&image, &target) {
            Ok(_) => Some(target),
            Err(e) => {
                tracing::warn!(target: "cover", image = %image.display(), error = %e, "Failed to copy folder cover");
                None
            }
        }
    }
}

fn first_image_in(dir: &Path) -> io::Result<Option<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();

    Ok(entries.into_iter().find(|path| {
        path.is_file()
            && crate::scanner::extension_lower(path)
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
    }))
}
