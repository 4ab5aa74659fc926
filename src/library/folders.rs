//! Folder hierarchy mirroring the local source trees.

use parking_lot::Mutex;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use crate::db;
use crate::error::Result;
use crate::model::MediaType;

/// Maps a file to the folder row of its directory, creating the chain of
/// folder rows from the root down on first sight.
///
/// Directory ids are cached for the life of the resolver. Folder rows are
/// never renamed or removed, so a cached id stays valid.
#[derive(Debug, Default)]
pub struct FolderResolver {
    cache: Mutex<HashMap<PathBuf, i64>>,
}

impl FolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folder id for `file_path`'s directory within the tree at `base`.
    ///
    /// Files directly under `base` have no folder. Files outside `base`
    /// get none either.
    pub async fn resolve(
        &self,
        pool: &SqlitePool,
        file_path: &Path,
        base: &Path,
        media_type: MediaType,
    ) -> Result<Option<i64>> {
        let Some(dir) = file_path.parent() else {
            return Ok(None);
        };
        if dir == base {
            return Ok(None);
        }
        if let Some(id) = self.cached(dir) {
            return Ok(Some(id));
        }

        let Ok(relative) = dir.strip_prefix(base) else {
            tracing::warn!(
                target: "library::folders",
                path = %file_path.display(),
                base = %base.display(),
                "File is outside its source root, no folder assigned"
            );
            return Ok(None);
        };

        let mut current = base.to_path_buf();
        let mut parent_id = None;
        for component in relative.components() {
            let Component::Normal(name) = component else {
                continue;
            };
            current.push(name);

            let id = match self.cached(&current) {
                Some(id) => id,
                None => {
                    let id = db::upsert_folder(
                        pool,
                        &current.to_string_lossy(),
                        &name.to_string_lossy(),
                        parent_id,
                        media_type,
                    )
                    .await?;
                    self.cache.lock().insert(current.clone(), id);
                    id
                }
            };
            parent_id = Some(id);
        }

        Ok(parent_id)
    }

    fn cached(&self, dir: &Path) -> Option<i64> {
        self.cache.lock().get(dir).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::temp_db;

    #[tokio::test]
    async fn test_root_file_has_no_folder() {
        let (pool, _dir) = temp_db().await;
        let resolver = FolderResolver::new();

        let id = resolver
            .resolve(&pool, Path::new("/lib/song.mp3"), Path::new("/lib"), MediaType::Music)
            .await
            .unwrap();
        assert_eq!(id, None);
        assert!(db::get_all_folders(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nested_path_builds_parent_chain() {
        let (pool, _dir) = temp_db().await;
        let resolver = FolderResolver::new();

        let leaf = resolver
            .resolve(
                &pool,
                Path::new("/lib/Artist/Album/01.mp3"),
                Path::new("/lib"),
                MediaType::Music,
            )
            .await
            .unwrap()
            .unwrap();

        let folders = db::get_all_folders(&pool).await.unwrap();
        assert_eq!(folders.len(), 2);

        let artist = folders.iter().find(|f| f.path == "/lib/Artist").unwrap();
        let album = folders.iter().find(|f| f.path == "/lib/Artist/Album").unwrap();
        assert_eq!(artist.parent_id, None);
        assert_eq!(artist.name, "Artist");
        assert_eq!(album.parent_id, Some(artist.id));
        assert_eq!(album.id, leaf);
    }

    #[tokio::test]
    async fn test_resolution_is_idempotent_across_resolvers() {
        let (pool, _dir) = temp_db().await;
        let file = Path::new("/books/Series/Book 1/ch01.mp3");
        let base = Path::new("/books");

        let first = FolderResolver::new()
            .resolve(&pool, file, base, MediaType::Audiobook)
            .await
            .unwrap();
        // A fresh cache must land on the same rows
        let second = FolderResolver::new()
            .resolve(&pool, file, base, MediaType::Audiobook)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(db::get_all_folders(&pool).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_siblings_share_parent() {
        let (pool, _dir) = temp_db().await;
        let resolver = FolderResolver::new();
        let base = Path::new("/lib");

        let a = resolver
            .resolve(&pool, Path::new("/lib/A/X/1.mp3"), base, MediaType::Music)
            .await
            .unwrap();
        let b = resolver
            .resolve(&pool, Path::new("/lib/A/Y/2.mp3"), base, MediaType::Music)
            .await
            .unwrap();
        assert_ne!(a, b);

        let folders = db::get_all_folders(&pool).await.unwrap();
        assert_eq!(folders.len(), 3);
        let parent = folders.iter().find(|f| f.path == "/lib/A").unwrap();
        assert!(folders
            .iter()
            .filter(|f| f.path != "/lib/A")
            .all(|f| f.parent_id == Some(parent.id)));
    }

    #[tokio::test]
    async fn test_outside_base_has_no_folder() {
        let (pool, _dir) = temp_db().await;
        let id = FolderResolver::new()
            .resolve(&pool, Path::new("/elsewhere/x/a.mp3"), Path::new("/lib"), MediaType::Music)
            .await
            .unwrap();
        assert_eq!(id, None);
    }
}
