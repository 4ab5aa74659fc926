//! Partial fetches of remote audio for tag probing.
//!
//! Remote items (`.strm` targets and WebDAV files) are never downloaded in
//! full. A single ranged `GET` pulls the head of the file, which is enough
//! for tags and cover art in every supported container, and lofty parses
//! the bytes in relaxed mode since the tail is missing.
//!
//! Every failure here degrades to "no remote metadata": the caller keeps
//! its defaults and the item is still imported.

use async_trait::async_trait;
use lofty::config::{ParseOptions, ParsingMode};
use lofty::probe::Probe;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use std::io::Cursor;
use std::time::Duration;

use super::TagSnapshot;
use crate::config::ProbeConfig;

/// Credentials attached to a remote request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub user: String,
    pub password: Option<String>,
}

/// Fetches the head of a remote file.
///
/// Implemented over HTTP in production; tests substitute canned bytes.
#[async_trait]
pub trait RangeFetch: Send + Sync {
    /// Return up to the configured number of leading bytes, or None when
    /// the request fails or the server answers anything but 200/206.
    async fn fetch_head(&self, url: &str, auth: Option<&BasicAuth>) -> Option<Vec<u8>>;
}

/// Ranged `GET` client built from [`ProbeConfig`].
pub struct HttpFetcher {
    client: reqwest::Client,
    range_bytes: u64,
}

impl HttpFetcher {
    pub fn new(probe: &ProbeConfig) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(probe.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(probe.max_redirects))
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self {
            client,
            range_bytes: probe.range_bytes,
        })
    }

    /// The underlying client, shared with the WebDAV walker.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    async fn try_fetch(
        &self,
        url: &str,
        auth: Option<&BasicAuth>,
    ) -> Result<Option<Vec<u8>>, reqwest::Error> {
        let mut request = self
            .client
            .get(url)
            .header(RANGE, format!("bytes=0-{}", self.range_bytes));
        if let Some(auth) = auth {
            request = request.basic_auth(&auth.user, auth.password.as_deref());
        }

        let mut response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            tracing::debug!(target: "metadata::remote", url, %status, "Probe rejected");
            return Ok(None);
        }

        // Servers ignoring the range header send the whole file
        let cap = usize::try_from(self.range_bytes.saturating_add(1)).unwrap_or(usize::MAX);
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let room = cap - body.len();
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= cap {
                break;
            }
        }

        Ok(Some(body))
    }
}

#[async_trait]
impl RangeFetch for HttpFetcher {
    async fn fetch_head(&self, url: &str, auth: Option<&BasicAuth>) -> Option<Vec<u8>> {
        match self.try_fetch(url, auth).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(target: "metadata::remote", url, error = %e, "Failed to fetch remote metadata");
                None
            }
        }
    }
}

/// Parse tags from the head of a file held in memory.
pub fn tags_from_bytes(bytes: Vec<u8>) -> Option<TagSnapshot> {
    let tagged = Probe::new(Cursor::new(bytes))
        .options(ParseOptions::new().parsing_mode(ParsingMode::Relaxed))
        .guess_file_type()
        .ok()?
        .read();

    match tagged {
        Ok(file) => Some(TagSnapshot::from_tagged_file(&file)),
        Err(e) => {
            tracing::debug!(target: "metadata::remote", error = %e, "Remote tags unreadable");
            None
        }
    }
}

/// Fetch and parse remote tags, off the async executor.
pub async fn probe_remote(
    fetcher: &dyn RangeFetch,
    url: &str,
    auth: Option<&BasicAuth>,
) -> Option<TagSnapshot> {
    let bytes = fetcher.fetch_head(url, auth).await?;
    tokio::task::spawn_blocking(move || tags_from_bytes(bytes))
        .await
        .ok()
        .flatten()
}

/// Resolve the content of a `.strm` file to an absolute target URL.
///
/// Returns None for an empty file. Targets not starting with `http` are
/// joined onto `base`, with a `/` inserted only when neither side has one.
pub fn resolve_strm_target(content: &str, base: Option<&str>) -> Option<String> {
    let target = content.trim();
    if target.is_empty() {
        return None;
    }
    if target.starts_with("http") {
        return Some(target.to_string());
    }

    let base = base.unwrap_or_default();
    let separator = if base.ends_with('/') || target.starts_with('/') {
        ""
    } else {
        "/"
    };
    Some(format!("{base}{separator}{target}"))
}

/// Percent-decode then re-encode a URL so already-encoded and raw targets
/// end up with the same catalog path.
pub fn normalize_url(url: &str) -> String {
    let decoded = urlencoding::decode(url)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| url.to_string());
    encode_uri(&decoded)
}

/// Percent-encode everything except URI-reserved and unreserved characters.
pub fn encode_uri(s: &str) -> String {
    const KEEP: &[u8] = b";,/?:@&=+$#-_.!~*'()";

    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        if byte.is_ascii_alphanumeric() || KEEP.contains(&byte) {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
