//! # markdown2img
//!
//! Render Markdown documents to a single, tightly cropped PNG, the way chat
//! bots post long answers as one image.
//!
//! ## Why this crate?
//!
//! Chat platforms render Markdown poorly or not at all; tables, code blocks
//! and formulas arrive as raw text. This crate lays the document out with a
//! real browser engine, searches for the viewport height that fits the whole
//! page, and crops the screenshot to the content.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Markdown
//!  │
//!  ├─ 1. Document  comrak + syntect → XHTML page, remote images cached locally
//!  ├─ 2. Surface   headless Chromium (or an HTTP render service)
//!  ├─ 3. Height    capture, measure bottom margin, grow viewport, repeat
//!  ├─ 4. Polish    crop to content ± padding, resample if the surface could not zoom
//!  └─ 5. Output    PNG bytes or "base64://…"
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use markdown2img::{render_markdown_to_base64, RenderConfig, RenderRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Browser discovered from MARKDOWN2IMG_BROWSER, PATH, or well-known installs
//!     let config = RenderConfig::builder().build()?;
//!     let request = RenderRequest::new("# Title\n\nBody text");
//!     let image = render_markdown_to_base64(&request, &config).await?;
//!     println!("{}…", &image[..32]);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `md2img` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! markdown2img = { version = "0.1", default-features = false }
//! ```
//!
//! ## Files on disk
//!
//! | Path | Lifetime |
//! |------|----------|
//! | `<tmp>/markdown_renderer/temp_<pid>_<seq>.{html,png}` | one render call |
//! | `<tmp>/markdown_renderer/image_cache/<md5>.<ext>`     | persistent |
//!
//! [`clean_up`] removes temp files left behind by a crashed process.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod render;
pub mod template;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{RenderConfig, RenderConfigBuilder, RenderRequest};
pub use error::{CaptureError, FetchError, PipelineError, RenderError};
pub use pipeline::cache::{CachedImage, HttpFetcher, ImageCache, ImageFetcher};
pub use pipeline::capture::{
    ChromeSurface, RenderSurface, ScalePlan, ScreenshotJob, ServiceSurface, SurfaceCapabilities,
};
pub use pipeline::document::{DocumentBuilder, RenderedDocument};
pub use pipeline::encode::to_base64_uri;
pub use pipeline::height::{BoundingBox, CaptureAttempt};
pub use progress::{NoopProgressCallback, ProgressCallback, RenderProgressCallback};
pub use render::{
    clean_up, render_markdown_to_base64, render_markdown_to_image_bytes, render_sync,
    render_to_file,
};
