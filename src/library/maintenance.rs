//! Catalog maintenance passes.
//!
//! Run at service start, by the `maintain` command and by compact-mode
//! imports. Each pass is idempotent.

use serde::Serialize;
use sqlx::SqlitePool;

use super::episode::extract_episode_number;
use super::status::{propagate_album, propagate_artist};
use super::Library;
use crate::db;
use crate::error::Result;
use crate::scanner::fingerprint_async;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    /// Tracks whose episode number changed
    pub recalibrated: usize,
    /// Tracks that received a fingerprint
    pub hashed: usize,
    pub albums_flipped: usize,
    pub artists_flipped: usize,
}

/// Recompute every ACTIVE track's episode number from its name.
pub async fn recalibrate_indices(pool: &SqlitePool) -> Result<usize> {
    let mut updated = 0;
    for track in db::get_active_tracks(pool).await? {
        let episode = extract_episode_number(&track.name);
        if episode != track.episode_number {
            db::set_episode_number(pool, track.id, episode).await?;
            updated += 1;
        }
    }

    tracing::info!(target: "library::maintenance", updated, "Episode numbers recalibrated");
    Ok(updated)
}

/// Fingerprint ACTIVE local tracks that have no hash yet.
///
/// Remote tracks are skipped. Missing files are logged and skipped.
pub async fn backfill_hashes(library: &Library) -> Result<usize> {
    let pool = library.pool();
    let mut hashed = 0;

    for track in db::get_active_tracks_without_hash(pool).await? {
        let Some(local) = library.resolve_local_path(&track.path) else {
            continue;
        };
        if !local.is_file() {
            tracing::warn!(target: "library::maintenance", track_id = track.id, path = %local.display(), "File missing, cannot backfill hash");
            continue;
        }

        let hash = fingerprint_async(&local).await;
        if !hash.is_empty() {
            db::set_track_hash(pool, track.id, &hash).await?;
            hashed += 1;
        }
    }

    tracing::info!(target: "library::maintenance", hashed, "Fingerprints backfilled");
    Ok(hashed)
}

/// Re-derive every album's status, then every artist's.
///
/// Returns (albums flipped, artists flipped).
pub async fn resync_statuses(pool: &SqlitePool) -> Result<(usize, usize)> {
    let mut albums = 0;
    let mut artists = 0;

    for album in db::get_all_albums(pool).await? {
        let result = propagate_album(pool, album.id).await?;
        if result.album.is_some() {
            albums += 1;
        }
        if result.artist.is_some() {
            artists += 1;
        }
    }
    for artist in db::get_all_artists(pool).await? {
        if propagate_artist(pool, artist.id).await?.is_some() {
            artists += 1;
        }
    }

    tracing::info!(target: "library::maintenance", albums, artists, "Statuses resynchronized");
    Ok((albums, artists))
}

/// All passes, in order.
pub async fn run_all(library: &Library) -> Result<MaintenanceReport> {
    let recalibrated = recalibrate_indices(library.pool()).await?;
    let hashed = backfill_hashes(library).await?;
    let (albums_flipped, artists_flipped) = resync_statuses(library.pool()).await?;

    Ok(MaintenanceReport {
        recalibrated,
        hashed,
        albums_flipped,
        artists_flipped,
    })
}
