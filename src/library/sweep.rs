//! Orphan sweep: trash tracks a full import did not see.

use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashSet};

use super::status::propagate_album;
use crate::db;
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Tracks moved to TRASHED
    pub trashed: u64,
    /// Albums whose status was re-derived
    pub albums_checked: usize,
    /// Albums that changed status
    pub albums_flipped: usize,
}

/// Trash every ACTIVE track whose id is not in `processed`, then re-derive
/// the status of every album those ACTIVE tracks belonged to.
pub async fn sweep_orphans(pool: &SqlitePool, processed: &HashSet<i64>) -> Result<SweepReport> {
    let active = db::get_active_track_refs(pool).await?;

    let orphans: Vec<i64> = active
        .iter()
        .map(|(id, _)| *id)
        .filter(|id| !processed.contains(id))
        .collect();
    let trashed = db::trash_tracks(pool, &orphans).await?;

    let albums: BTreeSet<i64> = active.iter().filter_map(|(_, album)| *album).collect();
    let mut albums_flipped = 0;
    for album_id in &albums {
        if propagate_album(pool, *album_id).await?.album.is_some() {
            albums_flipped += 1;
        }
    }

    let report = SweepReport {
        trashed,
        albums_checked: albums.len(),
        albums_flipped,
    };
    tracing::info!(
        target: "library::sweep",
        trashed = report.trashed,
        albums_flipped = report.albums_flipped,
        "Orphan sweep complete"
    );
    Ok(report)
}
