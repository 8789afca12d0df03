//! Configuration types for Markdown-to-image rendering.
//!
//! Two types split the knobs by lifetime:
//!
//! * [`RenderConfig`] — host-level settings that rarely change between
//!   calls (default font, work directory, browser, limits of the adaptive
//!   height search). Built via [`RenderConfigBuilder`].
//! * [`RenderRequest`] — the immutable input of one pipeline run (the
//!   Markdown text, canvas width, zoom, optional font override).
//!
//! Everything the original plugin kept in process-wide globals (font path,
//! GPU and linkify switches) lives in `RenderConfig` and is threaded into the
//! document builder and capture engine explicitly.

use crate::error::PipelineError;
use crate::pipeline::cache::ImageFetcher;
use crate::pipeline::capture::RenderSurface;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Name of the per-process work directory under the system temp dir.
pub const WORK_DIR_NAME: &str = "markdown_renderer";

/// Configuration shared by all render calls of a host.
///
/// Built via [`RenderConfig::builder()`] or using
/// [`RenderConfig::default()`].
///
/// # Example
/// ```rust
/// use markdown2img::RenderConfig;
///
/// let config = RenderConfig::builder()
///     .font_path("/usr/share/fonts/noto/NotoSansSC-Regular.otf")
///     .capture_timeout_secs(30)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct RenderConfig {
    /// Font used when a request does not name one. Default: None.
    pub font_path: Option<PathBuf>,

    /// Pass the GPU-disabling flags to the browser. Default: true.
    ///
    /// Headless servers rarely have a usable GPU; leaving acceleration on
    /// there makes Chromium crash or hang on startup.
    pub disable_gpu: bool,

    /// Disable automatic linking of bare URLs in the Markdown. Default: true.
    pub disable_linkify: bool,

    /// Directory for temp screenshots and the `image_cache/` subdirectory.
    /// If None, `<system temp>/markdown_renderer` is used.
    pub work_dir: Option<PathBuf>,

    /// Explicit browser executable. If None, `browser-locate` searches for one.
    pub browser_path: Option<PathBuf>,

    /// Base URL of an HTTP render service used instead of a local browser.
    pub render_service_url: Option<String>,

    /// Pre-constructed rendering surface. Takes precedence over
    /// `render_service_url` and `browser_path`.
    pub surface: Option<Arc<dyn RenderSurface>>,

    /// Pre-constructed image fetcher for the remote image cache.
    /// If None, an HTTPS client with `image_timeout_secs` is used.
    pub image_fetcher: Option<Arc<dyn ImageFetcher>>,

    /// Request timeout for each remote image download. Default: 5.
    pub image_timeout_secs: u64,

    /// How many `https` images per document are cached. Default: 3.
    ///
    /// Each download can block the run for up to `image_timeout_secs`, so
    /// the cap bounds the worst-case latency added by images.
    pub max_cached_images: usize,

    /// Hard cap on the viewport height in CSS pixels. Default: 50 000.
    pub max_height: u32,

    /// Bottom margin (image pixels) that counts as "all content captured".
    /// Default: 120.
    ///
    /// Renderers add their own bottom padding, so requiring a pixel-exact
    /// fit would keep growing the canvas forever.
    pub margin_threshold: u32,

    /// Maximum number of captures per run. Default: 6.
    pub max_attempts: u32,

    /// Padding kept above and below the detected content when cropping.
    /// Default: 32.
    pub vertical_padding: u32,

    /// Deadline for a single screenshot call in seconds. Default: 60.
    pub capture_timeout_secs: u64,

    /// Optional per-attempt progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            disable_gpu: true,
            disable_linkify: true,
            work_dir: None,
            browser_path: None,
            render_service_url: None,
            surface: None,
            image_fetcher: None,
            image_timeout_secs: 5,
            max_cached_images: 3,
            max_height: 50_000,
            margin_threshold: 120,
            max_attempts: 6,
            vertical_padding: 32,
            capture_timeout_secs: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for RenderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderConfig")
            .field("font_path", &self.font_path)
            .field("disable_gpu", &self.disable_gpu)
            .field("disable_linkify", &self.disable_linkify)
            .field("work_dir", &self.work_dir)
            .field("browser_path", &self.browser_path)
            .field("render_service_url", &self.render_service_url)
            .field("surface", &self.surface.as_ref().map(|s| s.name().to_string()))
            .field("image_fetcher", &self.image_fetcher.as_ref().map(|_| "<dyn ImageFetcher>"))
            .field("image_timeout_secs", &self.image_timeout_secs)
            .field("max_cached_images", &self.max_cached_images)
            .field("max_height", &self.max_height)
            .field("margin_threshold", &self.margin_threshold)
            .field("max_attempts", &self.max_attempts)
            .field("vertical_padding", &self.vertical_padding)
            .field("capture_timeout_secs", &self.capture_timeout_secs)
            .finish()
    }
}

impl RenderConfig {
    /// Create a new builder for `RenderConfig`.
    pub fn builder() -> RenderConfigBuilder {
        RenderConfigBuilder {
            config: Self::default(),
        }
    }

    /// The directory holding temp screenshots.
    pub fn resolved_work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(WORK_DIR_NAME))
    }

    /// The persistent remote-image cache directory.
    pub fn image_cache_dir(&self) -> PathBuf {
        self.resolved_work_dir().join("image_cache")
    }
}

/// Builder for [`RenderConfig`].
pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl fmt::Debug for RenderConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl RenderConfigBuilder {
    /// Start from the defaults overlaid with the host environment:
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `MARKDOWN2IMG_FONT_PATH` | `font_path` |
    /// | `MARKDOWN2IMG_DISABLE_GPU` | `disable_gpu` |
    /// | `MARKDOWN2IMG_DISABLE_LINKIFY` | `disable_linkify` |
    /// | `MARKDOWN2IMG_BROWSER` | `browser_path` |
    /// | `MARKDOWN2IMG_RENDER_SERVICE_URL` | `render_service_url` |
    pub fn from_env() -> Self {
        let mut builder = RenderConfig::builder();
        if let Some(font) = env_non_empty("MARKDOWN2IMG_FONT_PATH") {
            builder = builder.font_path(font);
        }
        if let Some(v) = env_non_empty("MARKDOWN2IMG_DISABLE_GPU").and_then(|v| parse_bool(&v)) {
            builder = builder.disable_gpu(v);
        }
        if let Some(v) =
            env_non_empty("MARKDOWN2IMG_DISABLE_LINKIFY").and_then(|v| parse_bool(&v))
        {
            builder = builder.disable_linkify(v);
        }
        if let Some(browser) = env_non_empty(browser_locate::BROWSER_ENV_VAR) {
            builder = builder.browser_path(browser);
        }
        if let Some(url) = env_non_empty("MARKDOWN2IMG_RENDER_SERVICE_URL") {
            builder = builder.render_service_url(url);
        }
        builder
    }

    pub fn font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.font_path = Some(path.into());
        self
    }

    pub fn disable_gpu(mut self, v: bool) -> Self {
        self.config.disable_gpu = v;
        self
    }

    pub fn disable_linkify(mut self, v: bool) -> Self {
        self.config.disable_linkify = v;
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    pub fn browser_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.browser_path = Some(path.into());
        self
    }

    pub fn render_service_url(mut self, url: impl Into<String>) -> Self {
        self.config.render_service_url = Some(url.into());
        self
    }

    pub fn surface(mut self, surface: Arc<dyn RenderSurface>) -> Self {
        self.config.surface = Some(surface);
        self
    }

    pub fn image_fetcher(mut self, fetcher: Arc<dyn ImageFetcher>) -> Self {
        self.config.image_fetcher = Some(fetcher);
        self
    }

    pub fn image_timeout_secs(mut self, secs: u64) -> Self {
        self.config.image_timeout_secs = secs.max(1);
        self
    }

    pub fn max_cached_images(mut self, n: usize) -> Self {
        self.config.max_cached_images = n;
        self
    }

    pub fn max_height(mut self, px: u32) -> Self {
        self.config.max_height = px.max(1);
        self
    }

    pub fn margin_threshold(mut self, px: u32) -> Self {
        self.config.margin_threshold = px;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n.max(1);
        self
    }

    pub fn vertical_padding(mut self, px: u32) -> Self {
        self.config.vertical_padding = px;
        self
    }

    pub fn capture_timeout_secs(mut self, secs: u64) -> Self {
        self.config.capture_timeout_secs = secs.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RenderConfig, PipelineError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if let Some(ref url) = c.render_service_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(PipelineError::InvalidConfig(format!(
                    "render service URL must be http(s), got '{}'",
                    url
                )));
            }
        }
        if c.disable_gpu {
            info!("GPU acceleration disabled for renderer compatibility");
        } else {
            warn!("GPU acceleration enabled; rendering may fail on headless servers without a GPU");
        }
        if c.disable_linkify {
            info!("Automatic linking of bare URLs disabled");
        }
        Ok(self.config)
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ── Request ──────────────────────────────────────────────────────────────

/// Default canvas width in CSS pixels.
pub const DEFAULT_CANVAS_WIDTH: u32 = 800;

/// Default zoom: 2× renders retina-sharp text.
pub const DEFAULT_ZOOM: f64 = 2.0;

/// Immutable input of one render call.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Markdown source.
    pub markdown: String,
    /// Font override for this call; falls back to [`RenderConfig::font_path`].
    pub font_path: Option<PathBuf>,
    /// Viewport width in CSS pixels. Fixed for the whole run.
    pub canvas_width: u32,
    /// Output scale factor.
    pub zoom: f64,
}

impl RenderRequest {
    /// A request with the default width (800) and zoom (2.0).
    pub fn new(markdown: impl Into<String>) -> Self {
        Self {
            markdown: markdown.into(),
            font_path: None,
            canvas_width: DEFAULT_CANVAS_WIDTH,
            zoom: DEFAULT_ZOOM,
        }
    }

    pub fn with_font(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_path = Some(path.into());
        self
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.canvas_width = width;
        self
    }

    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = zoom;
        self
    }

    /// Reject values no renderer can honour.
    pub(crate) fn validate(&self) -> Result<(), PipelineError> {
        if !self.zoom.is_finite() || self.zoom <= 0.0 {
            return Err(PipelineError::InvalidRequest(format!(
                "zoom must be a positive number, got {}",
                self.zoom
            )));
        }
        Ok(())
    }

    /// Canvas width with a 1 px floor.
    pub(crate) fn effective_width(&self) -> u32 {
        self.canvas_width.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = RenderConfig::default();
        assert!(c.disable_gpu);
        assert!(c.disable_linkify);
        assert_eq!(c.image_timeout_secs, 5);
        assert_eq!(c.max_cached_images, 3);
        assert_eq!(c.max_height, 50_000);
        assert_eq!(c.margin_threshold, 120);
        assert_eq!(c.max_attempts, 6);
        assert_eq!(c.vertical_padding, 32);
    }

    #[test]
    fn work_dir_defaults_under_system_temp() {
        let c = RenderConfig::default();
        let dir = c.resolved_work_dir();
        assert!(dir.starts_with(std::env::temp_dir()));
        assert!(dir.ends_with(WORK_DIR_NAME));
        assert_eq!(c.image_cache_dir(), dir.join("image_cache"));
    }

    #[test]
    fn builder_clamps_and_validates() {
        let c = RenderConfig::builder()
            .max_attempts(0)
            .capture_timeout_secs(0)
            .build()
            .unwrap();
        assert_eq!(c.max_attempts, 1);
        assert_eq!(c.capture_timeout_secs, 1);

        let err = RenderConfig::builder()
            .render_service_url("localhost:32180")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("render service URL"));
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn request_defaults_and_validation() {
        let r = RenderRequest::new("# hi");
        assert_eq!(r.canvas_width, 800);
        assert_eq!(r.zoom, 2.0);
        assert!(r.validate().is_ok());

        assert!(RenderRequest::new("x").with_zoom(0.0).validate().is_err());
        assert!(RenderRequest::new("x").with_zoom(f64::NAN).validate().is_err());
        assert_eq!(RenderRequest::new("x").with_width(0).effective_width(), 1);
    }
}
