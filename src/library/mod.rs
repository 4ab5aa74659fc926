//! The catalog-facing side of the library: turning scanned files into
//! tracks and keeping album and artist status consistent.
//!
//! [`Library`] owns everything a scan or a watcher event needs: the pool,
//! the configured roots, the metadata [`Extractor`], the folder cache and
//! the catalog lock that serializes import runs against watcher events.

pub mod episode;
pub mod folders;
pub mod maintenance;
pub mod reconcile;
pub mod status;
pub mod sweep;
pub mod watch;

pub use episode::{chinese_to_number, extract_episode_number};
pub use reconcile::{MatchedBy, Outcome, Placement, Reconciled, reconcile};
pub use status::{Propagation, propagate_album, propagate_artist};
pub use sweep::{SweepReport, sweep_orphans};
pub use watch::{WatchHandle, spawn_watcher};

use sqlx::SqlitePool;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::config::{Config, LibraryConfig, WebDavConfig};
use crate::cover::CoverCache;
use crate::error::{Result, ResultExt};
use crate::metadata::remote::{BasicAuth, HttpFetcher};
use crate::metadata::{Extractor, ScanResult};
use crate::model::MediaType;
use crate::scanner::fingerprint_async;
use crate::webdav::{self, WebDavSource};
use folders::FolderResolver;

/// Local directories the library works with.
#[derive(Debug, Clone)]
pub struct Roots {
    pub music: PathBuf,
    pub audiobook: PathBuf,
    /// Cover cache
    pub cache: PathBuf,
}

impl Roots {
    pub fn from_config(library: &LibraryConfig) -> Self {
        Self {
            music: library.music_path.clone(),
            audiobook: library.audiobook_path.clone(),
            cache: library.cache_path.clone(),
        }
    }

    pub fn root(&self, media_type: MediaType) -> &Path {
        match media_type {
            MediaType::Music => &self.music,
            MediaType::Audiobook => &self.audiobook,
        }
    }
}

/// Where a scanned item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// A file under a local root (`.strm` pointers included)
    Local,
    /// A file listed by a WebDAV server
    WebDav,
}

/// What a player should open for a catalog path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTarget {
    Remote {
        url: String,
        auth: Option<BasicAuth>,
    },
    Local(PathBuf),
}

pub struct Library {
    pool: SqlitePool,
    roots: Roots,
    extractor: Extractor,
    folders: FolderResolver,
    catalog_lock: Mutex<()>,
    webdav: WebDavConfig,
    http: reqwest::Client,
}

impl Library {
    pub fn new(pool: SqlitePool, roots: Roots, extractor: Extractor, webdav: WebDavConfig) -> Self {
        Self {
            pool,
            roots,
            extractor,
            folders: FolderResolver::new(),
            catalog_lock: Mutex::new(()),
            webdav,
            http: reqwest::Client::new(),
        }
    }

    /// Build the library described by `config`, creating the cover cache
    /// directory and the HTTP client used for remote sources.
    pub fn from_config(pool: SqlitePool, config: &Config) -> Result<Self> {
        let roots = Roots::from_config(&config.library);
        let covers = CoverCache::new(&roots.cache).with_context(format!(
            "Failed to create cover cache at {}",
            roots.cache.display()
        ))?;
        let fetcher = HttpFetcher::new(&config.probe)?;
        let http = fetcher.client().clone();
        let extractor = Extractor::new(
            covers,
            Arc::new(fetcher),
            config.library.strm_address.clone(),
        );

        Ok(Self::new(pool, roots, extractor, config.webdav.clone()).with_http_client(http))
    }

    /// Use `client` for WebDAV listings.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn roots(&self) -> &Roots {
        &self.roots
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    pub fn webdav_config(&self) -> &WebDavConfig {
        &self.webdav
    }

    /// Exclusive access to the catalog for one import run or one watcher
    /// event.
    pub async fn lock_catalog(&self) -> MutexGuard<'_, ()> {
        self.catalog_lock.lock().await
    }

    /// The root containing `path` and its media type. Music wins when the
    /// roots overlap.
    pub fn root_for(&self, path: &Path) -> Option<(&Path, MediaType)> {
        [MediaType::Music, MediaType::Audiobook]
            .into_iter()
            .map(|t| (self.roots.root(t), t))
            .find(|(root, _)| path.starts_with(root))
    }

    /// Credentials for WebDAV requests, when a user is configured.
    pub fn webdav_auth(&self) -> Option<BasicAuth> {
        self.webdav.user.as_ref().map(|user| BasicAuth {
            user: user.clone(),
            password: self.webdav.password.clone(),
        })
    }

    /// The WebDAV source configured for `media_type`, if any.
    pub fn webdav_source(&self, media_type: MediaType) -> Option<Result<WebDavSource>> {
        let url = match media_type {
            MediaType::Music => self.webdav.music_url.as_deref(),
            MediaType::Audiobook => self.webdav.audiobook_url.as_deref(),
        }?;

        Some(WebDavSource::new(
            url,
            self.webdav_auth(),
            self.http.clone(),
            Arc::clone(self.extractor.fetcher()),
            self.extractor.covers().clone(),
        ))
    }

    /// Map a catalog URI back to a local file.
    pub fn resolve_local_path(&self, uri: &str) -> Option<PathBuf> {
        let (root, rest) = if let Some(rest) = uri.strip_prefix("/music/") {
            (&self.roots.music, rest)
        } else if let Some(rest) = uri.strip_prefix("/audio/") {
            (&self.roots.audiobook, rest)
        } else {
            return None;
        };

        let mut path = root.clone();
        path.extend(rest.split('/').filter(|s| !s.is_empty()));
        Some(path)
    }

    /// Resolve a catalog path to something playable.
    ///
    /// WebDAV credentials are attached only to URLs under a configured
    /// WebDAV root.
    pub fn stream_target(&self, uri: &str) -> Option<StreamTarget> {
        if uri.starts_with("http") {
            let under_webdav = [&self.webdav.music_url, &self.webdav.audiobook_url]
                .into_iter()
                .flatten()
                .filter_map(|base| webdav::base_url(base).ok())
                .any(|base| uri.starts_with(base.as_str()));

            return Some(StreamTarget::Remote {
                url: uri.to_string(),
                auth: if under_webdav { self.webdav_auth() } else { None },
            });
        }

        self.resolve_local_path(uri).map(StreamTarget::Local)
    }

    /// Reconcile one scanned item.
    ///
    /// Local items get a folder and a fingerprint (a `.strm` file is
    /// fingerprinted like any other file); WebDAV items get neither.
    pub async fn process_item(
        &self,
        item: &ScanResult,
        media_type: MediaType,
        source: Source,
    ) -> Result<Reconciled> {
        let (uri, folder_id, hash) = match source {
            Source::WebDav => (item.path.clone(), None, String::new()),
            Source::Local => {
                let base = self.roots.root(media_type);
                let uri = if item.is_remote() {
                    item.path.clone()
                } else {
                    media_uri(&item.original_path, base, media_type)
                };
                let folder_id = self
                    .folders
                    .resolve(&self.pool, &item.original_path, base, media_type)
                    .await?;
                let hash = fingerprint_async(&item.original_path).await;
                (uri, folder_id, hash)
            }
        };

        let cover = item.cover_path.as_deref().and_then(cover_uri);
        let placement = Placement {
            uri: &uri,
            folder_id,
            hash: &hash,
            cover: cover.as_deref(),
        };
        reconcile(&self.pool, item, media_type, placement).await
    }

    /// Extract and reconcile one local file. None when the file could not
    /// be read.
    pub async fn import_file(&self, path: &Path, media_type: MediaType) -> Result<Option<Reconciled>> {
        let Some(item) = self.extractor.parse_file(path, media_type).await else {
            return Ok(None);
        };
        self.process_item(&item, media_type, Source::Local)
            .await
            .map(Some)
    }

    /// Folder id for a local file, creating folder rows as needed.
    pub async fn folder_for(&self, path: &Path, media_type: MediaType) -> Result<Option<i64>> {
        self.folders
            .resolve(&self.pool, path, self.roots.root(media_type), media_type)
            .await
    }
}

/// Catalog URI of a local file: `/music/<relative>` or `/audio/<relative>`
/// with forward slashes.
pub fn media_uri(path: &Path, base: &Path, media_type: MediaType) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    let segments: Vec<_> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect();
    format!("/{}/{}", media_type.uri_prefix(), segments.join("/"))
}

/// Catalog URI of a cached cover file.
pub fn cover_uri(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy();
    Some(format!("/covers/{name}"))
}
