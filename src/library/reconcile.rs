//! Track reconciliation: merge one scanned item into the catalog.
//!
//! Matching order is fixed:
//!
//! 1. fingerprint, when one was computed, against tracks of any status
//! 2. catalog path
//! 3. otherwise the item is new
//!
//! A match is refreshed in place and reactivated, which is how a moved or
//! re-added file keeps its track id. A new item resolves (or resurrects)
//! its artist and album before the track row is created.

use sqlx::SqlitePool;
use std::path::Path;

use super::episode::extract_episode_number;
use super::status::propagate_album;
use crate::db::{self, NewAlbum, NewTrack, TrackRefresh};
use crate::error::Result;
use crate::metadata::ScanResult;
use crate::model::{FileStatus, MediaType, UNKNOWN};

/// Where an item lives in the catalog, resolved before reconciliation.
#[derive(Debug, Clone, Copy)]
pub struct Placement<'a> {
    /// Catalog path: `/music/..`, `/audio/..` or a remote URL
    pub uri: &'a str,
    pub folder_id: Option<i64>,
    /// Fingerprint; empty when none could be computed
    pub hash: &'a str,
    /// Cover URI
    pub cover: Option<&'a str>,
}

/// How an existing track was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedBy {
    Hash,
    Path,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated(MatchedBy),
}

/// Result of reconciling one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    pub track_id: i64,
    pub outcome: Outcome,
}

/// Merge `item` into the catalog.
pub async fn reconcile(
    pool: &SqlitePool,
    item: &ScanResult,
    media_type: MediaType,
    placement: Placement<'_>,
) -> Result<Reconciled> {
    let by_hash = if placement.hash.is_empty() {
        None
    } else {
        db::find_track_by_hash(pool, placement.hash).await?
    };

    let existing = match by_hash {
        Some(track) => Some((track, MatchedBy::Hash)),
        None => db::find_track_by_path(pool, placement.uri)
            .await?
            .map(|track| (track, MatchedBy::Path)),
    };

    let reconciled = match existing {
        Some((track, matched_by)) => {
            db::refresh_track(pool, track.id, &refresh_for(item, &placement)).await?;
            if let Some(album_id) = track.album_id {
                propagate_album(pool, album_id).await?;
            }
            Reconciled {
                track_id: track.id,
                outcome: Outcome::Updated(matched_by),
            }
        }
        None => Reconciled {
            track_id: create(pool, item, media_type, &placement).await?,
            outcome: Outcome::Created,
        },
    };

    tracing::debug!(
        target: "library::reconcile",
        track_id = reconciled.track_id,
        outcome = ?reconciled.outcome,
        uri = placement.uri,
        "Reconciled item"
    );
    Ok(reconciled)
}

fn refresh_for(item: &ScanResult, placement: &Placement<'_>) -> TrackRefresh {
    let name = display_name(item);
    TrackRefresh {
        path: placement.uri.to_string(),
        folder_id: placement.folder_id,
        file_hash: (!placement.hash.is_empty()).then(|| placement.hash.to_string()),
        file_modified_at: modified_at(item),
        episode_number: extract_episode_number(&name),
        name,
        duration: item.duration.round() as i64,
        track_index: item.track_no.map(i64::from).unwrap_or(0),
    }
}

async fn create(
    pool: &SqlitePool,
    item: &ScanResult,
    media_type: MediaType,
    placement: &Placement<'_>,
) -> Result<i64> {
    let artist_name = item.artist.as_deref().unwrap_or(UNKNOWN);
    let album_name = item.album.as_deref().unwrap_or(UNKNOWN);

    let artist_id = match db::find_artist(pool, artist_name, media_type).await? {
        Some(artist) => {
            if artist.status == FileStatus::Trashed {
                db::set_artist_status(pool, artist.id, FileStatus::Active).await?;
            }
            artist.id
        }
        None => db::insert_artist(pool, artist_name, placement.cover, media_type).await?,
    };

    let album_id = match db::find_album(pool, album_name, artist_name, media_type).await? {
        Some(album) => {
            if album.status == FileStatus::Trashed {
                db::set_album_status(pool, album.id, FileStatus::Active).await?;
            }
            album.id
        }
        None => {
            let year = item.year.map(|y| y.to_string());
            db::insert_album(
                pool,
                &NewAlbum {
                    name: album_name,
                    artist: artist_name,
                    cover: placement.cover,
                    year: year.as_deref(),
                    media_type,
                },
            )
            .await?
        }
    };

    let name = display_name(item);
    let track = NewTrack {
        episode_number: extract_episode_number(&name),
        name,
        artist: artist_name.to_string(),
        album: album_name.to_string(),
        path: placement.uri.to_string(),
        duration: item.duration.round() as i64,
        file_hash: placement.hash.to_string(),
        folder_id: placement.folder_id,
        file_modified_at: Some(modified_at(item)),
        track_index: item.track_no.map(i64::from).unwrap_or(0),
        cover: placement.cover.map(str::to_string),
        lyrics: item.lyrics.clone(),
        media_type,
        artist_id: Some(artist_id),
        album_id: Some(album_id),
    };

    Ok(db::insert_track(pool, &track).await?)
}

/// Tag title, or the file name when the title is empty.
fn display_name(item: &ScanResult) -> String {
    if item.title.is_empty() {
        item.original_path
            .file_name()
            .or_else(|| Path::new(&item.path).file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        item.title.clone()
    }
}

fn modified_at(item: &ScanResult) -> String {
    item.modified
        .map(|m| m.to_rfc3339())
        .unwrap_or_else(db::now)
}


/// Property-based tests using proptest
#[cfg(test)]
mod proptests {
    use super::*;
    use crate::db::get_all_albums;
    use crate::test_utils::temp_db;
    use proptest::prelude::*;
    use std::path::PathBuf;

    #[derive(Debug, Clone)]
    enum Step {
        /// Scan file `n` into album `album` by artist `artist`
        Add { n: u8, album: u8, artist: u8 },
        /// Delete file `n`
        Remove { n: u8 },
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (0u8..6, 0u8..3, 0u8..2).prop_map(|(n, album, artist)| Step::Add { n, album, artist }),
            (0u8..6).prop_map(|n| Step::Remove { n }),
        ]
    }

    async fn assert_invariant(pool: &SqlitePool) -> std::result::Result<(), TestCaseError> {
        for album in get_all_albums(pool).await.unwrap() {
            let active = db::count_active_tracks_in_album(pool, album.id).await.unwrap();
            prop_assert!(
                album.status != FileStatus::Active || active > 0,
                "album {} is ACTIVE with no active tracks",
                album.name
            );
        }
        for artist in db::get_all_artists(pool).await.unwrap() {
            let active = db::count_active_albums_for_artist(pool, &artist.name, artist.media_type)
                .await
                .unwrap();
            prop_assert!(
                artist.status != FileStatus::Active || active > 0,
                "artist {} is ACTIVE with no active albums",
                artist.name
            );
        }
        Ok(())
    }

    async fn run(steps: Vec<Step>) -> std::result::Result<(), TestCaseError> {
        let (pool, _dir) = temp_db().await;

        for step in steps {
            match step {
                Step::Add { n, album, artist } => {
                    let uri = format!("/music/{n}.mp3");
                    let hash = format!("hash-{n}");
                    let scanned = ScanResult {
                        artist: Some(format!("artist-{artist}")),
                        album: Some(format!("album-{album}")),
                        ..ScanResult::with_defaults(uri.clone(), PathBuf::from(&uri))
                    };
                    let placement = Placement {
                        uri: &uri,
                        folder_id: None,
                        hash: &hash,
                        cover: None,
                    };
                    reconcile(&pool, &scanned, MediaType::Music, placement).await.unwrap();
                }
                Step::Remove { n } => {
                    let uri = format!("/music/{n}.mp3");
                    if let Some(track) = db::find_active_track_by_path(&pool, &uri).await.unwrap() {
                        db::trash_track(&pool, track.id).await.unwrap();
                        if let Some(album_id) = track.album_id {
                            propagate_album(&pool, album_id).await.unwrap();
                        }
                    }
                }
            }
            assert_invariant(&pool).await?;
        }
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// No ACTIVE album without ACTIVE tracks, no ACTIVE artist without
        /// ACTIVE albums, after every single step
        #[test]
        fn status_invariant_holds_after_every_step(steps in prop::collection::vec(step(), 1..20)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(run(steps))?;
        }
    }
}
