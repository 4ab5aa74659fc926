//! WebDAV source walker.
//!
//! Lists a remote tree with `PROPFIND` (`Depth: 1`) one directory at a time,
//! breadth-first, and turns audio files into [`ScanResult`]s by probing the
//! head of each file for tags.
//!
//! Catalog paths are the plain stream URLs. Credentials never go into the
//! catalog; they are attached per request here and at stream time by
//! [`crate::library::Library::stream_target`].

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cover::{self, CoverCache};
use crate::error::{Error, Result};
use crate::metadata::ScanResult;
use crate::metadata::remote::{self, BasicAuth, RangeFetch};
use crate::scanner::is_remote_audio_name;

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:resourcetype/>
    <d:getcontentlength/>
    <d:getlastmodified/>
  </d:prop>
</d:propfind>"#;

/// One file or directory reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Absolute URL of the entry
    pub url: Url,
    /// Percent-decoded server path, e.g. `/dav/music/a b.mp3`
    pub remote_path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl RemoteEntry {
    pub fn file_stem(&self) -> String {
        Path::new(&self.remote_path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A configured WebDAV root.
pub struct WebDavSource {
    base: Url,
    auth: Option<BasicAuth>,
    client: reqwest::Client,
    fetcher: Arc<dyn RangeFetch>,
    covers: CoverCache,
}

impl WebDavSource {
    /// Connect to a root URL.
    ///
    /// The URL is percent-decoded and stripped of a trailing slash first so
    /// configured URLs in either form address the same tree.
    pub fn new(
        url: &str,
        auth: Option<BasicAuth>,
        client: reqwest::Client,
        fetcher: Arc<dyn RangeFetch>,
        covers: CoverCache,
    ) -> Result<Self> {
        let base = base_url(url)?;
        tracing::info!(target: "webdav", base = %base, "WebDAV source initialized");
        Ok(Self {
            base,
            auth,
            client,
            fetcher,
            covers,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// List the direct children of one directory.
    pub async fn list(&self, dir: &Url) -> Result<Vec<RemoteEntry>> {
        let method = reqwest::Method::from_bytes(b"PROPFIND")
            .map_err(|e| Error::webdav(e.to_string()))?;

        let mut request = self
            .client
            .request(method, dir.clone())
            .header("Depth", "1")
            .header(CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(PROPFIND_BODY);
        if let Some(auth) = &self.auth {
            request = request.basic_auth(&auth.user, auth.password.as_deref());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::webdav(format!("PROPFIND {dir} returned {status}")));
        }

        let xml = response.text().await?;
        Ok(entries_from_multistatus(dir, &xml))
    }

    /// Every audio file under the root, breadth-first.
    ///
    /// A directory that cannot be listed is logged and skipped along with
    /// everything below it.
    pub async fn walk(&self) -> Vec<RemoteEntry> {
        let mut files = Vec::new();
        let mut queue = VecDeque::from([self.base.clone()]);
        let mut visited = HashSet::from([self.base.path().to_string()]);

        while let Some(dir) = queue.pop_front() {
            let entries = match self.list(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(target: "webdav", dir = %dir, error = %e, "Failed to list directory");
                    continue;
                }
            };

            for entry in entries {
                if entry.is_dir {
                    if visited.insert(entry.url.path().to_string()) {
                        queue.push_back(entry.url);
                    }
                } else if is_remote_audio_name(&entry.remote_path) {
                    files.push(entry);
                }
            }
        }

        files
    }

    /// Number of audio files under the root.
    pub async fn count(&self) -> usize {
        self.walk().await.len()
    }

    /// Build a scan result for a remote file, probing its tags.
    pub async fn parse_entry(&self, entry: &RemoteEntry) -> ScanResult {
        let mut item = ScanResult::with_defaults(
            entry.url.to_string(),
            PathBuf::from(&entry.remote_path),
        );
        item.title = entry.file_stem();
        item.size = entry.size;
        item.modified = entry.modified;

        let probed =
            remote::probe_remote(self.fetcher.as_ref(), entry.url.as_str(), self.auth.as_ref())
                .await;
        if let Some(mut tags) = probed {
            if let Some(cover) = tags.cover.take() {
                let name = cover::webdav_cover_name(&entry.remote_path, &cover.ext);
                item.cover_path = self.covers.store(&name, &cover);
            }
            item.apply_remote(tags);
        }

        item
    }
}

/// Normalize a configured root into a directory URL.
pub fn base_url(url: &str) -> Result<Url> {
    let decoded = urlencoding::decode(url)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| url.to_string());
    let trimmed = decoded.trim_end_matches('/');

    // A trailing slash makes relative joins land inside the directory
    Url::parse(&format!("{trimmed}/"))
        .map_err(|e| Error::webdav(format!("invalid WebDAV URL {url}: {e}")))
}

/// Resolve a multistatus body into entries, dropping the listed directory
/// itself.
pub fn entries_from_multistatus(dir: &Url, xml: &str) -> Vec<RemoteEntry> {
    let own_path = dir.path().trim_end_matches('/').to_string();

    let mut entries: Vec<RemoteEntry> = parse_multistatus(xml)
        .into_iter()
        .filter_map(|prop| {
            let mut url = match dir.join(&prop.href) {
                Ok(url) => url,
                Err(e) => {
                    tracing::debug!(target: "webdav", href = %prop.href, error = %e, "Skipping unparsable href");
                    return None;
                }
            };
            if url.path().trim_end_matches('/') == own_path {
                return None;
            }
            if prop.is_dir && !url.path().ends_with('/') {
                let path = format!("{}/", url.path());
                url.set_path(&path);
            }

            let remote_path = urlencoding::decode(url.path())
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| url.path().to_string());

            Some(RemoteEntry {
                url,
                remote_path,
                is_dir: prop.is_dir,
                size: prop.size,
                modified: prop.modified,
            })
        })
        .collect();

    entries.sort_by(|a, b| a.remote_path.cmp(&b.remote_path));
    entries
}

#[derive(Debug, Default)]
struct PropEntry {
    href: String,
    is_dir: bool,
    size: u64,
    modified: Option<DateTime<Utc>>,
}

fn parse_multistatus(xml: &str) -> Vec<PropEntry> {
    // Text is trimmed per element instead of per event: entity references
    // split text into several events and the spaces around them matter.
    let mut reader = Reader::from_reader(xml.as_bytes());

    let mut buf = Vec::new();
    let mut entries = Vec::new();
    let mut current: Option<PropEntry> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::warn!(target: "webdav", error = %e, "Malformed PROPFIND response");
                break;
            }

            Ok(Event::Start(ref e)) => {
                let local = local_name(e.name().as_ref());
                match local.as_str() {
                    "response" => current = Some(PropEntry::default()),
                    "collection" => {
                        if let Some(entry) = current.as_mut() {
                            entry.is_dir = true;
                        }
                    }
                    _ => {}
                }
                text.clear();
            }

            Ok(Event::Empty(ref e)) => {
                if local_name(e.name().as_ref()) == "collection"
                    && let Some(entry) = current.as_mut()
                {
                    entry.is_dir = true;
                }
            }

            Ok(Event::Text(ref e)) => {
                if let Ok(decoded) = e.decode() {
                    text.push_str(&decoded);
                }
            }

            Ok(Event::GeneralRef(ref e)) => {
                if let Ok(Some(ch)) = e.resolve_char_ref() {
                    text.push(ch);
                } else if let Ok(name) = e.decode()
                    && let Some(resolved) = resolve_predefined_entity(&name)
                {
                    text.push_str(resolved);
                }
            }

            Ok(Event::End(ref e)) => {
                let local = local_name(e.name().as_ref());
                if let Some(entry) = current.as_mut() {
                    let value = text.trim();
                    match local.as_str() {
                        "href" => entry.href = value.to_string(),
                        "getcontentlength" => entry.size = value.parse().unwrap_or(0),
                        "getlastmodified" => {
                            entry.modified = DateTime::parse_from_rfc2822(value)
                                .ok()
                                .map(|d| d.with_timezone(&Utc));
                        }
                        _ => {}
                    }
                }
                if local == "response"
                    && let Some(entry) = current.take()
                    && !entry.href.is_empty()
                {
                    entries.push(entry);
                }
                text.clear();
            }

            _ => {}
        }
        buf.clear();
    }

    entries
}

fn local_name(raw: &[u8]) -> String {
    let s = std::str::from_utf8(raw).unwrap_or("");
    match s.rfind(':') {
        Some(i) => s[i + 1..].to_lowercase(),
        None => s.to_lowercase(),
    }
}
