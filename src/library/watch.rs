//! Applying live filesystem changes to the catalog.
//!
//! [`spawn_watcher`] installs a polling [`FileWatcher`] over both local
//! roots and feeds its events to [`handle_event`], one at a time, each
//! under the catalog lock.
//!
//! | kind   | added                        | changed            | removed           |
//! |--------|------------------------------|--------------------|-------------------|
//! | audio  | resurrect by hash, or import | refresh tags       | trash + propagate |
//! | image  | recompute folder cover       | same               | same              |
//! | lyrics | attach to matching track     | same               | clear             |

use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{Library, media_uri, cover_uri, propagate_album};
use crate::config::WatcherConfig;
use crate::db::{self, MetadataRefresh};
use crate::error::Result;
use crate::model::MediaType;
use crate::scanner::{FileKind, FileWatcher, WatchEvent, classify, fingerprint_async, is_strm};

/// A running watcher.
///
/// Dropping it stops watching. Events already received are still applied,
/// and an event being handled always runs to completion.
pub struct WatchHandle {
    watcher: FileWatcher,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Directories being watched.
    pub fn roots(&self) -> &[PathBuf] {
        self.watcher.roots()
    }

    /// Stop watching and wait until every received event is applied.
    pub async fn stop(self) {
        let WatchHandle { watcher, task } = self;
        drop(watcher);
        if let Err(e) = task.await {
            tracing::warn!(target: "library::watch", error = %e, "Watcher task ended abnormally");
        }
    }
}

/// Watch the library's music and audiobook roots.
///
/// Roots that do not exist are skipped.
pub fn spawn_watcher(library: Arc<Library>, config: &WatcherConfig) -> Result<WatchHandle> {
    let mut roots: Vec<PathBuf> = Vec::new();
    for root in [&library.roots().music, &library.roots().audiobook] {
        if root.is_dir() && !roots.contains(root) {
            roots.push(root.clone());
        }
    }

    let (watcher, events) = FileWatcher::new(roots, config.poll_interval(), config.stability())?;
    let task = spawn_event_loop(library, events);

    Ok(WatchHandle { watcher, task })
}

/// Apply events in order until the sending side disconnects and the
/// queue is drained.
fn spawn_event_loop(library: Arc<Library>, events: Receiver<WatchEvent>) -> JoinHandle<()> {
    // Bridge the watcher's blocking channel into the runtime
    let (tx, mut rx) = mpsc::channel::<WatchEvent>(256);
    tokio::task::spawn_blocking(move || {
        loop {
            match events.recv_timeout(Duration::from_millis(250)) {
                Ok(event) => {
                    if tx.blocking_send(event).is_err() {
                        break;
                    }
                }
                // The runtime is shutting down
                Err(RecvTimeoutError::Timeout) if tx.is_closed() => break,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    });

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            handle_event(&library, event).await;
        }
    })
}

/// Apply one filesystem event. Failures are logged.
pub async fn handle_event(library: &Library, event: WatchEvent) {
    let path = match &event {
        WatchEvent::Error(message) => {
            tracing::warn!(target: "library::watch", error = %message, "Watcher reported an error");
            return;
        }
        WatchEvent::Added(p) | WatchEvent::Changed(p) | WatchEvent::Removed(p) => p.as_path(),
    };
    let Some((root, media_type)) = library.root_for(path) else {
        tracing::debug!(target: "library::watch", path = %path.display(), "Event outside library roots");
        return;
    };
    let root = root.to_path_buf();

    let _guard = library.lock_catalog().await;
    let result = match (classify(path), &event) {
        (FileKind::Audio, WatchEvent::Added(_)) => audio_added(library, path, &root, media_type).await,
        (FileKind::Audio, WatchEvent::Changed(_)) => {
            audio_changed(library, path, &root, media_type).await
        }
        (FileKind::Audio, WatchEvent::Removed(_)) => {
            audio_removed(library, path, &root, media_type).await
        }
        (FileKind::Image, _) => refresh_folder_cover(library, path).await,
        (FileKind::Lyrics, WatchEvent::Removed(_)) => set_lyrics_from(library, path, None).await,
        (FileKind::Lyrics, _) => match tokio::fs::read_to_string(path).await {
            Ok(text) => set_lyrics_from(library, path, Some(text.replace('\0', ""))).await,
            Err(e) => Err(e.into()),
        },
        _ => Ok(()),
    };

    if let Err(e) = result {
        tracing::warn!(target: "library::watch", path = %path.display(), error = %e, "Failed to apply file event");
    }
}

async fn audio_added(library: &Library, path: &Path, root: &Path, media_type: MediaType) -> Result<()> {
    let pool = library.pool();
    let hash = fingerprint_async(path).await;
    if hash.is_empty() {
        return Ok(());
    }

    let Some(track) = db::find_trashed_track_by_hash(pool, &hash).await? else {
        library.import_file(path, media_type).await?;
        return Ok(());
    };

    // Same content seen before: bring the old track back at the new path
    let strm_target = if is_strm(path) {
        library
            .extractor()
            .parse_file(path, media_type)
            .await
            .map(|item| item.path)
    } else {
        None
    };
    let uri = strm_target.unwrap_or_else(|| media_uri(path, root, media_type));
    let folder_id = library.folder_for(path, media_type).await?;

    db::relocate_track(pool, track.id, &uri, folder_id, &db::now()).await?;
    if let Some(album_id) = track.album_id {
        propagate_album(pool, album_id).await?;
    }
    tracing::info!(target: "library::watch", track_id = track.id, uri, "Resurrected moved track");
    Ok(())
}

async fn audio_changed(library: &Library, path: &Path, root: &Path, media_type: MediaType) -> Result<()> {
    let pool = library.pool();
    let Some(item) = library.extractor().parse_file(path, media_type).await else {
        return Ok(());
    };
    let uri = if item.is_remote() {
        item.path.clone()
    } else {
        media_uri(path, root, media_type)
    };

    let Some(track) = db::find_track_by_path(pool, &uri).await? else {
        tracing::warn!(target: "library::watch", uri, "Changed file has no track");
        return Ok(());
    };

    let name = if item.title.is_empty() {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        item.title.clone()
    };
    let refresh = MetadataRefresh {
        name,
        duration: item.duration.round() as i64,
        file_hash: fingerprint_async(path).await,
        file_modified_at: db::now(),
        cover: item.cover_path.as_deref().and_then(cover_uri),
        lyrics: item.lyrics.clone(),
        artist: item.artist.clone().unwrap_or(track.artist),
        album: item.album.clone().unwrap_or(track.album),
    };
    db::refresh_track_metadata(pool, track.id, &refresh).await?;
    tracing::info!(target: "library::watch", track_id = track.id, "Refreshed track metadata");
    Ok(())
}

async fn audio_removed(library: &Library, path: &Path, root: &Path, media_type: MediaType) -> Result<()> {
    let pool = library.pool();
    let uri = media_uri(path, root, media_type);
    let Some(track) = db::find_active_track_by_path(pool, &uri).await? else {
        return Ok(());
    };

    db::trash_track(pool, track.id).await?;
    if let Some(album_id) = track.album_id {
        propagate_album(pool, album_id).await?;
    }
    tracing::info!(target: "library::watch", track_id = track.id, uri, "Trashed removed track");
    Ok(())
}

/// Recompute the folder cover for every ACTIVE track in the image's
/// directory, and their albums. No image left clears the cover.
async fn refresh_folder_cover(library: &Library, image: &Path) -> Result<()> {
    let pool = library.pool();
    let Some(dir) = image.parent() else {
        return Ok(());
    };
    let Some(folder) = db::find_folder_by_path(pool, &dir.to_string_lossy()).await? else {
        return Ok(());
    };
    let tracks = db::get_active_tracks_in_folder(pool, folder.id).await?;
    if tracks.is_empty() {
        return Ok(());
    }

    let covers = library.extractor().covers().clone();
    let dir = dir.to_path_buf();
    let cached = tokio::task::spawn_blocking(move || covers.find_cover_in_directory(&dir)).await?;
    let cover = cached.as_deref().and_then(cover_uri);

    let mut albums: Vec<i64> = Vec::new();
    for track in &tracks {
        db::set_track_cover(pool, track.id, cover.as_deref()).await?;
        if let Some(album_id) = track.album_id
            && !albums.contains(&album_id)
        {
            albums.push(album_id);
        }
    }
    for album_id in &albums {
        db::set_album_cover(pool, *album_id, cover.as_deref()).await?;
    }

    tracing::info!(
        target: "library::watch",
        folder = %folder.path,
        tracks = tracks.len(),
        albums = albums.len(),
        cover = ?cover,
        "Updated folder cover"
    );
    Ok(())
}

/// Attach (or clear) lyrics on the ACTIVE track in the same folder whose
/// file stem matches the sidecar's.
async fn set_lyrics_from(library: &Library, sidecar: &Path, lyrics: Option<String>) -> Result<()> {
    let pool = library.pool();
    let (Some(dir), Some(stem)) = (sidecar.parent(), sidecar.file_stem()) else {
        return Ok(());
    };
    let Some(folder) = db::find_folder_by_path(pool, &dir.to_string_lossy()).await? else {
        return Ok(());
    };

    for track in db::get_active_tracks_in_folder(pool, folder.id).await? {
        let Some(local) = library.resolve_local_path(&track.path) else {
            continue;
        };
        if local.file_stem() == Some(stem) {
            db::set_track_lyrics(pool, track.id, lyrics.as_deref()).await?;
            tracing::info!(
                target: "library::watch",
                track_id = track.id,
                attached = lyrics.is_some(),
                "Updated lyrics"
            );
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileStatus;
    use crate::test_utils::TestLibrary;

    #[tokio::test]
    async fn test_added_file_is_imported() {
        let lib = TestLibrary::new().await;
        let path = lib.add_music("Band/Record/01.wav", 1);

        handle_event(&lib.library, WatchEvent::Added(path)).await;

        let track = db::find_track_by_path(&lib.pool, "/music/Band/Record/01.wav")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(track.status, FileStatus::Active);
    }

    #[tokio::test]
    async fn test_removed_file_is_trashed_with_album() {
        let lib = TestLibrary::new().await;
        let path = lib.add_music("Band/Record/01.wav", 1);
        let id = lib
            .library
            .import_file(&path, MediaType::Music)
            .await
            .unwrap()
            .unwrap()
            .track_id;

        std::fs::remove_file(&path).unwrap();
        handle_event(&lib.library, WatchEvent::Removed(path)).await;

        let track = db::get_track(&lib.pool, id).await.unwrap().unwrap();
        assert_eq!(track.status, FileStatus::Trashed);
        let album = db::get_album(&lib.pool, track.album_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(album.status, FileStatus::Trashed);
    }

    #[tokio::test]
    async fn test_moved_file_is_resurrected() {
        let lib = TestLibrary::new().await;
        let old = lib.add_music("Old/01.wav", 3);
        let id = lib
            .library
            .import_file(&old, MediaType::Music)
            .await
            .unwrap()
            .unwrap()
            .track_id;

        let new = lib.music_root().join("New").join("01.wav");
        std::fs::create_dir_all(new.parent().unwrap()).unwrap();
        std::fs::rename(&old, &new).unwrap();
        handle_event(&lib.library, WatchEvent::Removed(old)).await;
        handle_event(&lib.library, WatchEvent::Added(new.clone())).await;

        let track = db::get_track(&lib.pool, id).await.unwrap().unwrap();
        assert_eq!(track.status, FileStatus::Active);
        assert_eq!(track.path, "/music/New/01.wav");
        assert_eq!(db::count_tracks(&lib.pool).await.unwrap(), 1);

        let folder = db::find_folder_by_path(&lib.pool, &new.parent().unwrap().to_string_lossy())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(track.folder_id, Some(folder.id));
        let album = db::get_album(&lib.pool, track.album_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(album.status, FileStatus::Active);
    }

    #[tokio::test]
    async fn test_changed_file_refreshes_tags_but_not_status() {
        let lib = TestLibrary::new().await;
        let path = lib.add_music("A/01.wav", 1);
        let id = lib
            .library
            .import_file(&path, MediaType::Music)
            .await
            .unwrap()
            .unwrap()
            .track_id;

        crate::test_utils::tag_file(&path, |tag| {
            use lofty::tag::Accessor;
            tag.set_title("Renamed".to_string());
            tag.set_artist("New Artist".to_string());
        });
        handle_event(&lib.library, WatchEvent::Changed(path)).await;

        let track = db::get_track(&lib.pool, id).await.unwrap().unwrap();
        assert_eq!(track.name, "Renamed");
        assert_eq!(track.artist, "New Artist");
        assert_eq!(track.album, crate::model::UNKNOWN);
        assert!(track.has_hash());
    }

    #[tokio::test]
    async fn test_image_events_update_folder_cover() {
        let lib = TestLibrary::new().await;
        let path = lib.add_music("Band/Record/01.wav", 1);
        let id = lib
            .library
            .import_file(&path, MediaType::Music)
            .await
            .unwrap()
            .unwrap()
            .track_id;

        let image = path.parent().unwrap().join("folder.jpg");
        std::fs::write(&image, b"jpeg bytes").unwrap();
        handle_event(&lib.library, WatchEvent::Added(image.clone())).await;

        let track = db::get_track(&lib.pool, id).await.unwrap().unwrap();
        assert_eq!(track.cover.as_deref(), Some("/covers/Record_cover.jpg"));
        let album = db::get_album(&lib.pool, track.album_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(album.cover.as_deref(), Some("/covers/Record_cover.jpg"));

        std::fs::remove_file(&image).unwrap();
        handle_event(&lib.library, WatchEvent::Removed(image)).await;

        let track = db::get_track(&lib.pool, id).await.unwrap().unwrap();
        assert_eq!(track.cover, None);
    }

    #[tokio::test]
    async fn test_lyrics_attach_and_clear() {
        let lib = TestLibrary::new().await;
        let path = lib.add_music("A/song.wav", 1);
        let other = lib.add_music("A/other.wav", 2);
        let id = lib
            .library
            .import_file(&path, MediaType::Music)
            .await
            .unwrap()
            .unwrap()
            .track_id;
        let other_id = lib
            .library
            .import_file(&other, MediaType::Music)
            .await
            .unwrap()
            .unwrap()
            .track_id;

        let lrc = path.with_extension("lrc");
        std::fs::write(&lrc, "[00:01.00]hello").unwrap();
        handle_event(&lib.library, WatchEvent::Added(lrc.clone())).await;

        let track = db::get_track(&lib.pool, id).await.unwrap().unwrap();
        assert_eq!(track.lyrics.as_deref(), Some("[00:01.00]hello"));
        let untouched = db::get_track(&lib.pool, other_id).await.unwrap().unwrap();
        assert_eq!(untouched.lyrics, None);

        std::fs::remove_file(&lrc).unwrap();
        handle_event(&lib.library, WatchEvent::Removed(lrc)).await;
        let track = db::get_track(&lib.pool, id).await.unwrap().unwrap();
        assert_eq!(track.lyrics, None);
    }

    #[tokio::test]
    async fn test_events_outside_roots_are_ignored() {
        let lib = TestLibrary::new().await;
        let outside = lib.dir.path().join("elsewhere").join("x.wav");
        crate::test_utils::write_wav(&outside, 8000, 1);

        handle_event(&lib.library, WatchEvent::Added(outside)).await;
        handle_event(&lib.library, WatchEvent::Error("boom".to_string())).await;
        assert_eq!(db::count_tracks(&lib.pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_spawn_watcher_watches_existing_roots() {
        let lib = TestLibrary::new().await;
        let handle = spawn_watcher(Arc::clone(&lib.library), &WatcherConfig::default()).unwrap();

        assert_eq!(handle.roots().len(), 2);
        assert!(handle.roots().contains(&lib.music_root()));
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_queued_events_are_applied_after_watcher_stops() {
        let lib = TestLibrary::new().await;
        let path = lib.add_music("Band/Record/01.wav", 1);
        let id = lib
            .library
            .import_file(&path, MediaType::Music)
            .await
            .unwrap()
            .unwrap()
            .track_id;
        std::fs::remove_file(&path).unwrap();

        // An import holds the catalog while the event is queued and the
        // watcher goes away
        let guard = lib.library.lock_catalog().await;
        let (tx, rx) = crossbeam_channel::unbounded();
        let task = spawn_event_loop(Arc::clone(&lib.library), rx);
        tx.send(WatchEvent::Removed(path)).unwrap();
        drop(tx);
        drop(guard);
        task.await.unwrap();

        let track = db::get_track(&lib.pool, id).await.unwrap().unwrap();
        assert_eq!(track.status, FileStatus::Trashed);
        let album = db::get_album(&lib.pool, track.album_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(album.status, FileStatus::Trashed);
    }
}
