//! Remote image cache: download `https` images once and point the document
//! at local copies.
//!
//! Headless browsers regularly choke on remote images (self-signed
//! certificates, hotlink protection, slow hosts), and a failed image load
//! still costs the full network timeout on every render. The cache moves the
//! download out of the browser:
//!
//! ```text
//! <img src="https://host/a.png">  ──▶  md5(url) = 3f2a…
//!                                       <cache_dir>/3f2a….png exists?
//!                                         yes ─▶ file:///…/3f2a….png
//!                                         no  ─▶ fetch ─▶ write tmp ─▶ rename
//! ```
//!
//! Entries are content-addressed by URL, never expire, and are written
//! atomically so a concurrent reader never sees a half-written file.
//! Failures never propagate: the original URL stays in the document.

use crate::error::FetchError;
use crate::template::IMAGE_USER_AGENT;
use async_trait::async_trait;
use md5::{Digest, Md5};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Extension used when the URL carries no usable one.
pub const DEFAULT_EXTENSION: &str = "jpg";

static RE_IMG_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<img[^>]+src="([^"]+)"[^>]*>"#).expect("static regex is valid")
});

/// Downloads the raw bytes of a remote image.
///
/// The default implementation is [`HttpFetcher`]; tests and hosts with
/// their own HTTP stack inject a different one via
/// [`crate::config::RenderConfigBuilder::image_fetcher`].
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// reqwest-backed fetcher: fixed timeout, redirects followed, any TLS
/// certificate accepted, browser User-Agent.
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(IMAGE_USER_AGENT)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let request_error = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    secs: self.timeout_secs,
                }
            } else {
                FetchError::Request {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        };

        let response = self.client.get(url).send().await.map_err(request_error)?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        let bytes = response.bytes().await.map_err(request_error)?;
        Ok(bytes.to_vec())
    }
}

/// One cache slot, derived purely from the source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedImage {
    pub source_url: String,
    /// MD5 of the URL bytes.
    pub content_hash: [u8; 16],
    pub file_extension: String,
    pub local_path: PathBuf,
}

impl CachedImage {
    /// File name inside the cache directory: `<md5-hex>.<ext>`.
    pub fn file_name(&self) -> String {
        format!("{}.{}", hex::encode(self.content_hash), self.file_extension)
    }
}

/// Persistent, content-addressed store of downloaded images.
#[derive(Clone)]
pub struct ImageCache {
    dir: PathBuf,
    fetcher: Arc<dyn ImageFetcher>,
}

impl ImageCache {
    /// Cache rooted at `dir` (created lazily on first store).
    pub fn new(dir: impl Into<PathBuf>, fetcher: Arc<dyn ImageFetcher>) -> Self {
        let dir = dir.into();
        let dir = std::path::absolute(&dir).unwrap_or(dir);
        Self { dir, fetcher }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The slot `url` maps to.
    pub fn entry_for(&self, url: &str) -> CachedImage {
        let content_hash: [u8; 16] = Md5::digest(url.as_bytes()).into();
        let file_extension = extension_of(url);
        let mut entry = CachedImage {
            source_url: url.to_string(),
            content_hash,
            file_extension,
            local_path: PathBuf::new(),
        };
        entry.local_path = self.dir.join(entry.file_name());
        entry
    }

    /// Resolve `url` to a `file://` URI of a local copy.
    ///
    /// Non-http(s) URLs and any download or write failure yield `url`
    /// unchanged.
    pub async fn resolve(&self, url: &str) -> String {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            warn!("Image URL has no http(s) scheme, leaving it to the renderer: {}", url);
            return url.to_string();
        }

        let entry = self.entry_for(url);
        if tokio::fs::try_exists(&entry.local_path).await.unwrap_or(false) {
            match file_uri(&entry.local_path) {
                Some(uri) => {
                    info!("Using cached image: {}", url);
                    return uri;
                }
                None => return url.to_string(),
            }
        }

        match self.download(&entry).await {
            Ok(uri) => {
                info!("Cached image: {} → {}", url, entry.local_path.display());
                uri
            }
            Err(e) => {
                error!("Failed to cache image {}: {}", url, e);
                url.to_string()
            }
        }
    }

    async fn download(&self, entry: &CachedImage) -> Result<String, FetchError> {
        let bytes = self.fetcher.fetch(&entry.source_url).await?;

        let dir = self.dir.clone();
        let target = entry.local_path.clone();
        tokio::task::spawn_blocking(move || store_atomically(&dir, &target, &bytes))
            .await
            .map_err(|e| FetchError::Store {
                path: entry.local_path.clone(),
                source: std::io::Error::other(format!("store task panicked: {e}")),
            })??;

        file_uri(&entry.local_path).ok_or_else(|| FetchError::Store {
            path: entry.local_path.clone(),
            source: std::io::Error::other("cache path is not absolute"),
        })
    }

    /// Rewrite the `src` of the first `max_images` `https` `<img>` tags in
    /// an HTML fragment to local `file://` URIs.
    ///
    /// The fragment is returned byte-identical when it contains no
    /// candidate, and every tag past the limit is left untouched.
    pub async fn localize_html(&self, fragment: &str, max_images: usize) -> String {
        let candidates: Vec<(usize, usize)> = RE_IMG_SRC
            .captures_iter(fragment)
            .filter_map(|caps| caps.get(1))
            .filter(|src| src.as_str().starts_with("https://"))
            .map(|src| (src.start(), src.end()))
            .collect();

        if candidates.is_empty() {
            return fragment.to_string();
        }

        warn!(
            "Found {} https image(s), caching up to {} locally to avoid TLS failures in the renderer",
            candidates.len(),
            max_images
        );

        let mut out = String::with_capacity(fragment.len());
        let mut cursor = 0;
        for (start, end) in candidates.into_iter().take(max_images) {
            let src = &fragment[start..end];
            let url = unescape_amp(src);
            let resolved = self.resolve(&url).await;
            out.push_str(&fragment[cursor..start]);
            if resolved == url {
                out.push_str(src);
            } else {
                out.push_str(&resolved);
            }
            cursor = end;
        }
        out.push_str(&fragment[cursor..]);
        debug!("Localised image sources ({} → {} bytes)", fragment.len(), out.len());
        out
    }
}

/// Text after the last `.` of the URL's last path segment, when it is 1 to 8
/// ASCII alphanumerics; [`DEFAULT_EXTENSION`] otherwise.
pub fn extension_of(url: &str) -> String {
    let last_segment = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .unwrap_or_default();

    last_segment
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| (1..=8).contains(&ext.len()) && ext.bytes().all(|b| b.is_ascii_alphanumeric()))
        .unwrap_or(DEFAULT_EXTENSION)
        .to_string()
}

fn unescape_amp(src: &str) -> String {
    src.replace("&amp;", "&")
}

fn file_uri(path: &Path) -> Option<String> {
    reqwest::Url::from_file_path(path).ok().map(|u| u.to_string())
}

/// Write to a temp file in `dir`, then rename over `target`.
fn store_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), FetchError> {
    let store_err = |source: std::io::Error| FetchError::Store {
        path: target.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(dir).map_err(store_err)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(store_err)?;
    tmp.write_all(bytes).map_err(store_err)?;
    tmp.persist(target).map_err(|e| store_err(e.error))?;
    Ok(())
}
