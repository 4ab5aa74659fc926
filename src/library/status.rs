//! Derived album and artist status.
//!
//! Albums and artists have no files of their own; their status follows
//! their children. After any track status change:
//!
//! - an ACTIVE album with no ACTIVE tracks becomes TRASHED, and a TRASHED
//!   album with ACTIVE tracks becomes ACTIVE
//! - the same rule then applies to the album's artist, counting ACTIVE
//!   albums credited to the artist's name
//!
//! Nothing is written when the stored status already agrees.

use sqlx::SqlitePool;

use crate::db;
use crate::error::Result;
use crate::model::FileStatus;

/// Status changes made by one propagation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Propagation {
    pub album: Option<FileStatus>,
    pub artist: Option<FileStatus>,
}

impl Propagation {
    pub fn changed(&self) -> bool {
        self.album.is_some() || self.artist.is_some()
    }
}

/// The status an entity should move to, if any.
fn derived_status(current: FileStatus, active_children: i64) -> Option<FileStatus> {
    match (current, active_children) {
        (FileStatus::Active, 0) => Some(FileStatus::Trashed),
        (FileStatus::Trashed, n) if n > 0 => Some(FileStatus::Active),
        _ => None,
    }
}

/// Re-derive an album's status and, if it flipped, its artist's.
///
/// A missing album is a no-op.
pub async fn propagate_album(pool: &SqlitePool, album_id: i64) -> Result<Propagation> {
    let Some(album) = db::get_album(pool, album_id).await? else {
        return Ok(Propagation::default());
    };

    let active = db::count_active_tracks_in_album(pool, album.id).await?;
    let Some(status) = derived_status(album.status, active) else {
        return Ok(Propagation::default());
    };

    db::set_album_status(pool, album.id, status).await?;
    tracing::debug!(target: "library::status", album_id = album.id, ?status, "Album status changed");

    let artist = match db::find_artist(pool, &album.artist, album.media_type).await? {
        Some(artist) => propagate_artist(pool, artist.id).await?,
        None => None,
    };

    Ok(Propagation {
        album: Some(status),
        artist,
    })
}

/// Re-derive an artist's status. Returns the new status if it flipped.
pub async fn propagate_artist(pool: &SqlitePool, artist_id: i64) -> Result<Option<FileStatus>> {
    let Some(artist) = db::get_artist(pool, artist_id).await? else {
        return Ok(None);
    };

    let active = db::count_active_albums_for_artist(pool, &artist.name, artist.media_type).await?;
    let Some(status) = derived_status(artist.status, active) else {
        return Ok(None);
    };

    db::set_artist_status(pool, artist.id, status).await?;
    tracing::debug!(target: "library::status", artist_id = artist.id, ?status, "Artist status changed");

    Ok(Some(status))
}
