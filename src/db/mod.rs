//! Catalog persistence for tracks, albums, artists and folders.
//!
//! Uses SQLx with SQLite for lightweight, embedded storage. This module is
//! the only place that writes SQL; the reconciliation logic in
//! [`crate::library`] talks to the catalog exclusively through these
//! functions.
//!
//! # Example
//!
//! ```ignore
//! use soundshelf::db::{init_db, find_track_by_hash};
//!
//! let pool = init_db("sqlite:soundshelf.db").await?;
//! let track = find_track_by_hash(&pool, "ab12...").await?;
//! ```

use std::path::Path;

use serde::Serialize;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{Sqlite, SqlitePool, SqlitePoolOptions};
use sqlx::QueryBuilder;

use crate::model::{Album, Artist, FileStatus, Folder, MediaType, Track};

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "soundshelf.db";

/// Largest id list sent in one bulk status update.
pub const TRASH_CHUNK_SIZE: usize = 500;

/// Expands to a `SELECT` over every track column followed by `$rest`.
macro_rules! select_tracks {
    ($rest:literal) => {
        concat!(
            "SELECT id, name, artist, album, path, duration, file_hash, folder_id, status, \
             trashed_at, file_modified_at, track_index, episode_number, cover, lyrics, \
             media_type, artist_id, album_id, created_at FROM tracks ",
            $rest
        )
    };
}

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist, establishes a connection
/// pool with up to 5 connections, and runs all pending migrations.
pub async fn init_db(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
        Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Current time as stored in timestamp columns.
pub fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

// ============================================================================
// Tracks
// ============================================================================

/// Fields of a track created by the NEW branch of reconciliation.
#[derive(Debug, Clone)]
pub struct NewTrack {
    pub name: String,
    pub artist: String,
    pub album: String,
    pub path: String,
    pub duration: i64,
    pub file_hash: String,
    pub folder_id: Option<i64>,
    pub file_modified_at: Option<String>,
    pub track_index: i64,
    pub episode_number: i64,
    pub cover: Option<String>,
    pub lyrics: Option<String>,
    pub media_type: MediaType,
    pub artist_id: Option<i64>,
    pub album_id: Option<i64>,
}

/// In-place refresh applied when a scanned item matches an existing track.
///
/// Always reactivates the row. `file_hash: None` keeps the stored hash.
#[derive(Debug, Clone)]
pub struct TrackRefresh {
    pub path: String,
    pub folder_id: Option<i64>,
    pub file_hash: Option<String>,
    pub file_modified_at: String,
    pub name: String,
    pub duration: i64,
    pub track_index: i64,
    pub episode_number: i64,
}

/// Tag-level refresh applied by the watcher when a file's content changes.
/// Leaves folder and status untouched. An empty `file_hash` keeps the
/// stored one.
#[derive(Debug, Clone)]
pub struct MetadataRefresh {
    pub name: String,
    pub duration: i64,
    pub file_hash: String,
    pub file_modified_at: String,
    pub cover: Option<String>,
    pub lyrics: Option<String>,
    pub artist: String,
    pub album: String,
}

/// Find any track (regardless of status) carrying this fingerprint.
pub async fn find_track_by_hash(pool: &SqlitePool, hash: &str) -> sqlx::Result<Option<Track>> {
    sqlx::query_as::<_, Track>(select_tracks!("WHERE file_hash = ? ORDER BY id LIMIT 1"))
        .bind(hash)
        .fetch_optional(pool)
        .await
}

/// Find a TRASHED track carrying this fingerprint.
pub async fn find_trashed_track_by_hash(
    pool: &SqlitePool,
    hash: &str,
) -> sqlx::Result<Option<Track>> {
    sqlx::query_as::<_, Track>(select_tracks!(
        "WHERE file_hash = ? AND status = ? ORDER BY id LIMIT 1"
    ))
    .bind(hash)
    .bind(FileStatus::Trashed)
    .fetch_optional(pool)
    .await
}

/// Find a track by exact catalog path, preferring an ACTIVE row.
pub async fn find_track_by_path(pool: &SqlitePool, path: &str) -> sqlx::Result<Option<Track>> {
    sqlx::query_as::<_, Track>(select_tracks!(
        "WHERE path = ? ORDER BY (status = 'ACTIVE') DESC, id LIMIT 1"
    ))
    .bind(path)
    .fetch_optional(pool)
    .await
}

/// Find the ACTIVE track stored at this catalog path.
pub async fn find_active_track_by_path(
    pool: &SqlitePool,
    path: &str,
) -> sqlx::Result<Option<Track>> {
    sqlx::query_as::<_, Track>(select_tracks!(
        "WHERE path = ? AND status = ? ORDER BY id LIMIT 1"
    ))
    .bind(path)
    .bind(FileStatus::Active)
    .fetch_optional(pool)
    .await
}

/// Get a track by its database ID.
pub async fn get_track(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<Track>> {
    sqlx::query_as::<_, Track>(select_tracks!("WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Get every track, in id order.
pub async fn get_all_tracks(pool: &SqlitePool) -> sqlx::Result<Vec<Track>> {
    sqlx::query_as::<_, Track>(select_tracks!("ORDER BY id"))
        .fetch_all(pool)
        .await
}

/// Get every ACTIVE track, in id order.
pub async fn get_active_tracks(pool: &SqlitePool) -> sqlx::Result<Vec<Track>> {
    sqlx::query_as::<_, Track>(select_tracks!("WHERE status = ? ORDER BY id"))
        .bind(FileStatus::Active)
        .fetch_all(pool)
        .await
}

/// ACTIVE tracks whose fingerprint is missing or empty.
pub async fn get_active_tracks_without_hash(pool: &SqlitePool) -> sqlx::Result<Vec<Track>> {
    sqlx::query_as::<_, Track>(select_tracks!(
        "WHERE status = ? AND (file_hash IS NULL OR file_hash = '') ORDER BY id"
    ))
    .bind(FileStatus::Active)
    .fetch_all(pool)
    .await
}

/// ACTIVE tracks that reference this folder.
pub async fn get_active_tracks_in_folder(
    pool: &SqlitePool,
    folder_id: i64,
) -> sqlx::Result<Vec<Track>> {
    sqlx::query_as::<_, Track>(select_tracks!(
        "WHERE folder_id = ? AND status = ? ORDER BY id"
    ))
    .bind(folder_id)
    .bind(FileStatus::Active)
    .fetch_all(pool)
    .await
}

/// (id, album_id) of every ACTIVE track.
pub async fn get_active_track_refs(pool: &SqlitePool) -> sqlx::Result<Vec<(i64, Option<i64>)>> {
    sqlx::query_as("SELECT id, album_id FROM tracks WHERE status = ? ORDER BY id")
        .bind(FileStatus::Active)
        .fetch_all(pool)
        .await
}

/// Insert a new ACTIVE track and return its id.
pub async fn insert_track(pool: &SqlitePool, track: &NewTrack) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO tracks (
            name, artist, album, path, duration, file_hash, folder_id, status, trashed_at,
            file_modified_at, track_index, episode_number, cover, lyrics, media_type,
            artist_id, album_id, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&track.name)
    .bind(&track.artist)
    .bind(&track.album)
    .bind(&track.path)
    .bind(track.duration)
    .bind(&track.file_hash)
    .bind(track.folder_id)
    .bind(FileStatus::Active)
    .bind(&track.file_modified_at)
    .bind(track.track_index)
    .bind(track.episode_number)
    .bind(&track.cover)
    .bind(&track.lyrics)
    .bind(track.media_type)
    .bind(track.artist_id)
    .bind(track.album_id)
    .bind(now())
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

/// Apply a scan refresh: move, reactivate and resync metadata in one statement.
pub async fn refresh_track(pool: &SqlitePool, id: i64, r: &TrackRefresh) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        UPDATE tracks SET
            path = ?,
            folder_id = ?,
            status = ?,
            trashed_at = NULL,
            file_hash = COALESCE(?, file_hash),
            file_modified_at = ?,
            name = ?,
            duration = ?,
            track_index = ?,
            episode_number = ?
        WHERE id = ?
        "#,
    )
    .bind(&r.path)
    .bind(r.folder_id)
    .bind(FileStatus::Active)
    .bind(&r.file_hash)
    .bind(&r.file_modified_at)
    .bind(&r.name)
    .bind(r.duration)
    .bind(r.track_index)
    .bind(r.episode_number)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Reactivate a track at a new location without touching its tags.
pub async fn relocate_track(
    pool: &SqlitePool,
    id: i64,
    path: &str,
    folder_id: Option<i64>,
    modified_at: &str,
) -> sqlx::Result<()> {
    sqlx::query(
        "UPDATE tracks SET path = ?, folder_id = ?, status = ?, trashed_at = NULL, \
         file_modified_at = ? WHERE id = ?",
    )
    .bind(path)
    .bind(folder_id)
    .bind(FileStatus::Active)
    .bind(modified_at)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Overwrite tag-derived fields of a track.
pub async fn refresh_track_metadata(
    pool: &SqlitePool,
    id: i64,
    m: &MetadataRefresh,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        UPDATE tracks SET
            name = ?, duration = ?, file_hash = COALESCE(NULLIF(?, ''), file_hash),
            file_modified_at = ?, cover = ?, lyrics = ?, artist = ?, album = ?
        WHERE id = ?
        "#,
    )
    .bind(&m.name)
    .bind(m.duration)
    .bind(&m.file_hash)
    .bind(&m.file_modified_at)
    .bind(&m.cover)
    .bind(&m.lyrics)
    .bind(&m.artist)
    .bind(&m.album)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Soft-delete one track.
pub async fn trash_track(pool: &SqlitePool, id: i64) -> sqlx::Result<()> {
    sqlx::query("UPDATE tracks SET status = ?, trashed_at = ? WHERE id = ?")
        .bind(FileStatus::Trashed)
        .bind(now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Soft-delete a set of tracks, [`TRASH_CHUNK_SIZE`] ids per statement.
///
/// Returns the number of rows updated.
pub async fn trash_tracks(pool: &SqlitePool, ids: &[i64]) -> sqlx::Result<u64> {
    let stamp = now();
    let mut updated = 0;

    for chunk in ids.chunks(TRASH_CHUNK_SIZE) {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE tracks SET status = ");
        qb.push_bind(FileStatus::Trashed);
        qb.push(", trashed_at = ");
        qb.push_bind(stamp.clone());
        qb.push(" WHERE id IN (");
        let mut ids_sep = qb.separated(", ");
        for id in chunk {
            ids_sep.push_bind(*id);
        }
        ids_sep.push_unseparated(")");

        updated += qb.build().execute(pool).await?.rows_affected();
    }

    Ok(updated)
}

/// Set (or clear) a track's cover URI.
pub async fn set_track_cover(pool: &SqlitePool, id: i64, cover: Option<&str>) -> sqlx::Result<()> {
    sqlx::query("UPDATE tracks SET cover = ? WHERE id = ?")
        .bind(cover)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Set (or clear) a track's lyrics.
pub async fn set_track_lyrics(
    pool: &SqlitePool,
    id: i64,
    lyrics: Option<&str>,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE tracks SET lyrics = ? WHERE id = ?")
        .bind(lyrics)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_track_hash(pool: &SqlitePool, id: i64, hash: &str) -> sqlx::Result<()> {
    sqlx::query("UPDATE tracks SET file_hash = ? WHERE id = ?")
        .bind(hash)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_episode_number(pool: &SqlitePool, id: i64, episode: i64) -> sqlx::Result<()> {
    sqlx::query("UPDATE tracks SET episode_number = ? WHERE id = ?")
        .bind(episode)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Number of ACTIVE tracks referencing an album.
pub async fn count_active_tracks_in_album(pool: &SqlitePool, album_id: i64) -> sqlx::Result<i64> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM tracks WHERE album_id = ? AND status = ?")
            .bind(album_id)
            .bind(FileStatus::Active)
            .fetch_one(pool)
            .await?;
    Ok(row.0)
}

pub async fn count_tracks(pool: &SqlitePool) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tracks")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

// ============================================================================
// Artists
// ============================================================================

/// Find an artist by (name, type), including TRASHED ones.
pub async fn find_artist(
    pool: &SqlitePool,
    name: &str,
    media_type: MediaType,
) -> sqlx::Result<Option<Artist>> {
    sqlx::query_as::<_, Artist>(
        "SELECT id, name, avatar, media_type, status, trashed_at FROM artists \
         WHERE name = ? AND media_type = ?",
    )
    .bind(name)
    .bind(media_type)
    .fetch_optional(pool)
    .await
}

pub async fn get_artist(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<Artist>> {
    sqlx::query_as::<_, Artist>(
        "SELECT id, name, avatar, media_type, status, trashed_at FROM artists WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn get_all_artists(pool: &SqlitePool) -> sqlx::Result<Vec<Artist>> {
    sqlx::query_as::<_, Artist>(
        "SELECT id, name, avatar, media_type, status, trashed_at FROM artists ORDER BY id",
    )
    .fetch_all(pool)
    .await
}

/// Insert an ACTIVE artist and return its id.
pub async fn insert_artist(
    pool: &SqlitePool,
    name: &str,
    avatar: Option<&str>,
    media_type: MediaType,
) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO artists (name, avatar, media_type, status) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(name)
    .bind(avatar)
    .bind(media_type)
    .bind(FileStatus::Active)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

/// Set an artist's status; TRASHED stamps the current time, ACTIVE clears it.
pub async fn set_artist_status(pool: &SqlitePool, id: i64, status: FileStatus) -> sqlx::Result<()> {
    let trashed_at = (status == FileStatus::Trashed).then(now);
    sqlx::query("UPDATE artists SET status = ?, trashed_at = ? WHERE id = ?")
        .bind(status)
        .bind(trashed_at)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Number of ACTIVE albums credited to an artist name within a media type.
pub async fn count_active_albums_for_artist(
    pool: &SqlitePool,
    artist: &str,
    media_type: MediaType,
) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM albums WHERE artist = ? AND media_type = ? AND status = ?",
    )
    .bind(artist)
    .bind(media_type)
    .bind(FileStatus::Active)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

// ============================================================================
// Albums
// ============================================================================

/// Fields of an album created by the NEW branch of reconciliation.
#[derive(Debug, Clone)]
pub struct NewAlbum<'a> {
    pub name: &'a str,
    pub artist: &'a str,
    pub cover: Option<&'a str>,
    pub year: Option<&'a str>,
    pub media_type: MediaType,
}

/// Find an album by (name, artist, type), including TRASHED ones.
pub async fn find_album(
    pool: &SqlitePool,
    name: &str,
    artist: &str,
    media_type: MediaType,
) -> sqlx::Result<Option<Album>> {
    sqlx::query_as::<_, Album>(
        "SELECT id, name, artist, cover, year, media_type, status, trashed_at FROM albums \
         WHERE name = ? AND artist = ? AND media_type = ?",
    )
    .bind(name)
    .bind(artist)
    .bind(media_type)
    .fetch_optional(pool)
    .await
}

pub async fn get_album(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<Album>> {
    sqlx::query_as::<_, Album>(
        "SELECT id, name, artist, cover, year, media_type, status, trashed_at FROM albums \
         WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn get_all_albums(pool: &SqlitePool) -> sqlx::Result<Vec<Album>> {
    sqlx::query_as::<_, Album>(
        "SELECT id, name, artist, cover, year, media_type, status, trashed_at FROM albums \
         ORDER BY id",
    )
    .fetch_all(pool)
    .await
}

/// Insert an ACTIVE album and return its id.
pub async fn insert_album(pool: &SqlitePool, album: &NewAlbum<'_>) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO albums (name, artist, cover, year, media_type, status) \
         VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(album.name)
    .bind(album.artist)
    .bind(album.cover)
    .bind(album.year)
    .bind(album.media_type)
    .bind(FileStatus::Active)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

/// Set an album's status; TRASHED stamps the current time, ACTIVE clears it.
pub async fn set_album_status(pool: &SqlitePool, id: i64, status: FileStatus) -> sqlx::Result<()> {
    let trashed_at = (status == FileStatus::Trashed).then(now);
    sqlx::query("UPDATE albums SET status = ?, trashed_at = ? WHERE id = ?")
        .bind(status)
        .bind(trashed_at)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_album_cover(pool: &SqlitePool, id: i64, cover: Option<&str>) -> sqlx::Result<()> {
    sqlx::query("UPDATE albums SET cover = ? WHERE id = ?")
        .bind(cover)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

// ============================================================================
// Folders
// ============================================================================

/// Insert a folder row keyed by absolute path, or return the existing id.
///
/// An existing row is never modified.
pub async fn upsert_folder(
    pool: &SqlitePool,
    path: &str,
    name: &str,
    parent_id: Option<i64>,
    media_type: MediaType,
) -> sqlx::Result<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO folders (path, name, parent_id, media_type)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(path) DO UPDATE SET path = folders.path
        RETURNING id
        "#,
    )
    .bind(path)
    .bind(name)
    .bind(parent_id)
    .bind(media_type)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

pub async fn find_folder_by_path(pool: &SqlitePool, path: &str) -> sqlx::Result<Option<Folder>> {
    sqlx::query_as::<_, Folder>(
        "SELECT id, path, name, parent_id, media_type FROM folders WHERE path = ?",
    )
    .bind(path)
    .fetch_optional(pool)
    .await
}

pub async fn get_all_folders(pool: &SqlitePool) -> sqlx::Result<Vec<Folder>> {
    sqlx::query_as::<_, Folder>(
        "SELECT id, path, name, parent_id, media_type FROM folders ORDER BY id",
    )
    .fetch_all(pool)
    .await
}

// ============================================================================
// Statistics
// ============================================================================

/// Row counts per table and status, for the `status` command.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogStats {
    pub tracks_active: i64,
    pub tracks_trashed: i64,
    pub albums_active: i64,
    pub albums_trashed: i64,
    pub artists_active: i64,
    pub artists_trashed: i64,
    pub folders: i64,
}

pub async fn catalog_stats(pool: &SqlitePool) -> sqlx::Result<CatalogStats> {
    async fn by_status(pool: &SqlitePool, sql: &str) -> sqlx::Result<(i64, i64)> {
        let rows: Vec<(FileStatus, i64)> = sqlx::query_as(sql).fetch_all(pool).await?;
        let count = |s| {
            rows.iter()
                .find(|(status, _)| *status == s)
                .map(|(_, n)| *n)
                .unwrap_or(0)
        };
        Ok((count(FileStatus::Active), count(FileStatus::Trashed)))
    }

    let (tracks_active, tracks_trashed) =
        by_status(pool, "SELECT status, COUNT(*) FROM tracks GROUP BY status").await?;
    let (albums_active, albums_trashed) =
        by_status(pool, "SELECT status, COUNT(*) FROM albums GROUP BY status").await?;
    let (artists_active, artists_trashed) =
        by_status(pool, "SELECT status, COUNT(*) FROM artists GROUP BY status").await?;
    let (folders,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM folders")
        .fetch_one(pool)
        .await?;

    Ok(CatalogStats {
        tracks_active,
        tracks_trashed,
        albums_active,
        albums_trashed,
        artists_active,
        artists_trashed,
        folders,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{new_track, temp_db};

    #[test]
    fn test_db_url() {
        assert_eq!(db_url(None), "sqlite:soundshelf.db");
        assert_eq!(
            db_url(Some(Path::new("/tmp/lib.db"))),
            "sqlite:/tmp/lib.db"
        );
    }

    #[tokio::test]
    async fn test_upsert_folder_is_idempotent() {
        let (pool, _dir) = temp_db().await;

        let a = upsert_folder(&pool, "/m/A", "A", None, MediaType::Music).await.unwrap();
        let b = upsert_folder(&pool, "/m/A", "renamed", None, MediaType::Music).await.unwrap();
        assert_eq!(a, b);

        let folder = find_folder_by_path(&pool, "/m/A").await.unwrap().unwrap();
        assert_eq!(folder.name, "A");
    }

    #[tokio::test]
    async fn test_find_track_by_hash_ignores_status() {
        let (pool, _dir) = temp_db().await;

        let id = insert_track(&pool, &new_track("/music/a.mp3", "h1")).await.unwrap();
        trash_track(&pool, id).await.unwrap();

        let found = find_track_by_hash(&pool, "h1").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.status, FileStatus::Trashed);
        assert!(found.trashed_at.is_some());

        let trashed = find_trashed_track_by_hash(&pool, "h1").await.unwrap();
        assert!(trashed.is_some());
        assert!(find_active_track_by_path(&pool, "/music/a.mp3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_track_keeps_hash_when_none() {
        let (pool, _dir) = temp_db().await;
        let id = insert_track(&pool, &new_track("/music/a.mp3", "h1")).await.unwrap();
        trash_track(&pool, id).await.unwrap();

        let refresh = TrackRefresh {
            path: "/music/b.mp3".to_string(),
            folder_id: None,
            file_hash: None,
            file_modified_at: now(),
            name: "B".to_string(),
            duration: 12,
            track_index: 3,
            episode_number: 0,
        };
        refresh_track(&pool, id, &refresh).await.unwrap();

        let track = get_track(&pool, id).await.unwrap().unwrap();
        assert_eq!(track.path, "/music/b.mp3");
        assert_eq!(track.file_hash.as_deref(), Some("h1"));
        assert_eq!(track.status, FileStatus::Active);
        assert!(track.trashed_at.is_none());
        assert_eq!(track.track_index, 3);
    }

    #[tokio::test]
    async fn test_refresh_metadata_keeps_hash_when_empty() {
        let (pool, _dir) = temp_db().await;
        let id = insert_track(&pool, &new_track("/music/a.mp3", "h1")).await.unwrap();

        let mut refresh = MetadataRefresh {
            name: "Retagged".to_string(),
            duration: 200,
            file_hash: String::new(),
            file_modified_at: now(),
            cover: None,
            lyrics: Some("la".to_string()),
            artist: "Artist".to_string(),
            album: "Album".to_string(),
        };
        refresh_track_metadata(&pool, id, &refresh).await.unwrap();

        let track = get_track(&pool, id).await.unwrap().unwrap();
        assert_eq!(track.name, "Retagged");
        assert_eq!(track.file_hash.as_deref(), Some("h1"));
        assert_eq!(find_track_by_hash(&pool, "h1").await.unwrap().unwrap().id, id);

        refresh.file_hash = "h2".to_string();
        refresh_track_metadata(&pool, id, &refresh).await.unwrap();
        let track = get_track(&pool, id).await.unwrap().unwrap();
        assert_eq!(track.file_hash.as_deref(), Some("h2"));
    }

    #[tokio::test]
    async fn test_trash_tracks_in_chunks() {
        let (pool, _dir) = temp_db().await;

        let mut ids = Vec::new();
        for i in 0..(TRASH_CHUNK_SIZE + 7) {
            let t = new_track(&format!("/music/{i}.mp3"), &format!("h{i}"));
            ids.push(insert_track(&pool, &t).await.unwrap());
        }

        let updated = trash_tracks(&pool, &ids).await.unwrap();
        assert_eq!(updated as usize, ids.len());

        let stats = catalog_stats(&pool).await.unwrap();
        assert_eq!(stats.tracks_active, 0);
        assert_eq!(stats.tracks_trashed as usize, ids.len());
    }

    #[tokio::test]
    async fn test_status_setters_stamp_and_clear() {
        let (pool, _dir) = temp_db().await;
        let id = insert_album(
            &pool,
            &NewAlbum {
                name: "Album",
                artist: "Artist",
                cover: None,
                year: Some("1999"),
                media_type: MediaType::Music,
            },
        )
        .await
        .unwrap();

        set_album_status(&pool, id, FileStatus::Trashed).await.unwrap();
        let album = get_album(&pool, id).await.unwrap().unwrap();
        assert_eq!(album.status, FileStatus::Trashed);
        assert!(album.trashed_at.is_some());

        set_album_status(&pool, id, FileStatus::Active).await.unwrap();
        let album = get_album(&pool, id).await.unwrap().unwrap();
        assert_eq!(album.status, FileStatus::Active);
        assert!(album.trashed_at.is_none());
    }
}
