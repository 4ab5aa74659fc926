//! Core data models for the catalog.
//!
//! Defines the persisted entities: [`Track`], [`Album`], [`Artist`] and
//! [`Folder`], plus the two enums every row carries.
//!
//! # Database Schema
//!
//! The models map to the following tables:
//! - `artists` - unique by (name, media_type)
//! - `albums` - unique by (name, artist, media_type); the artist link is by name
//! - `folders` - one row per directory level, unique by absolute path
//! - `tracks` - playable items with soft-delete status

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Placeholder used when a tag carries no artist or album.
pub const UNKNOWN: &str = "未知";

/// Content type of a catalog entry or source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaType {
    Music,
    Audiobook,
}

impl MediaType {
    /// Prefix used for catalog URIs of local files of this type.
    pub fn uri_prefix(self) -> &'static str {
        match self {
            MediaType::Music => "music",
            MediaType::Audiobook => "audio",
        }
    }
}

/// Soft-delete lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum FileStatus {
    Active,
    Trashed,
}

/// An artist, identified by (name, media type).
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Artist {
    pub id: i64,
    pub name: String,
    /// Cover URI captured from the first track that created the artist
    pub avatar: Option<String>,
    pub media_type: MediaType,
    pub status: FileStatus,
    pub trashed_at: Option<String>,
}

/// An album, identified by (name, artist name, media type).
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Album {
    pub id: i64,
    pub name: String,
    /// Artist name (albums link to artists by name, not by id)
    pub artist: String,
    pub cover: Option<String>,
    pub year: Option<String>,
    pub media_type: MediaType,
    pub status: FileStatus,
    pub trashed_at: Option<String>,
}

/// A directory node mirroring one level of a source tree.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Folder {
    pub id: i64,
    /// Absolute path (unique)
    pub path: String,
    pub name: String,
    pub parent_id: Option<i64>,
    pub media_type: MediaType,
}

/// A playable item.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Track {
    pub id: i64,
    /// Display name (tag title or file name)
    pub name: String,
    pub artist: String,
    pub album: String,
    /// Catalog URI: `/music/..`, `/audio/..` or an `http(s)` URL
    pub path: String,
    /// Duration in whole seconds
    pub duration: i64,
    /// Sampling fingerprint; None or empty when unavailable
    pub file_hash: Option<String>,
    pub folder_id: Option<i64>,
    pub status: FileStatus,
    pub trashed_at: Option<String>,
    pub file_modified_at: Option<String>,
    /// Native track number, 0 when absent
    pub track_index: i64,
    /// Derived sort key, see [`crate::library::episode`]
    pub episode_number: i64,
    pub cover: Option<String>,
    pub lyrics: Option<String>,
    pub media_type: MediaType,
    pub artist_id: Option<i64>,
    pub album_id: Option<i64>,
    pub created_at: String,
}

impl Track {
    /// Whether the stored fingerprint can be used for matching.
    pub fn has_hash(&self) -> bool {
        self.file_hash.as_deref().is_some_and(|h| !h.is_empty())
    }
}
