//! Error types for the markdown2img library.
//!
//! Errors are layered the same way the pipeline is:
//!
//! * [`FetchError`] — a remote image could not be cached. **Recovered**
//!   inside [`crate::pipeline::cache`]: the original URL stays in the
//!   document and the renderer gets a chance to load it itself.
//!
//! * [`CaptureError`] — the rendering surface failed to produce a
//!   screenshot. **Fatal** for the run; travels unchanged through the
//!   height resolver.
//!
//! * [`PipelineError`] — union of everything a stage may fail with.
//!
//! * [`RenderError`] — the single public error. Only the orchestrator in
//!   [`crate::render`] builds one, so callers match on exactly one type and
//!   always get a human-readable message.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The one error returned by every `render_*` entry point.
///
/// `message` is always non-empty. The typed cause stays reachable via
/// [`std::error::Error::source`] (or [`RenderError::cause`]) for callers that
/// want to branch on it.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RenderError {
    message: String,
    #[source]
    source: PipelineError,
}

impl RenderError {
    /// Normalise a stage failure into the public error.
    ///
    /// Falls back to a category-based message when the underlying error
    /// renders as an empty string.
    pub(crate) fn from_pipeline(source: PipelineError) -> Self {
        let detail = source.to_string();
        let message = if detail.trim().is_empty() {
            fallback_message(&source)
        } else {
            detail
        };
        Self { message, source }
    }

    /// Human-readable description of the failure.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The typed stage error behind this failure.
    pub fn cause(&self) -> &PipelineError {
        &self.source
    }
}

fn fallback_message(source: &PipelineError) -> String {
    if source.is_certificate_related() {
        "TLS certificate verification failed, most likely while loading an https image".to_string()
    } else {
        format!("Rendering failed: {}", source.category())
    }
}

/// Every failure a pipeline stage can report.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Request / config ──────────────────────────────────────────────────
    /// The caller supplied an unusable request.
    #[error("Invalid render request: {0}")]
    InvalidRequest(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Workspace ─────────────────────────────────────────────────────────
    /// The temp directory or one of its files could not be prepared.
    #[error("Failed to prepare work directory '{path}': {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Document ──────────────────────────────────────────────────────────
    /// comrak could not serialise the parsed document.
    #[error("Markdown conversion failed: {0}")]
    Markdown(String),

    // ── Capture ───────────────────────────────────────────────────────────
    /// The rendering surface did not produce a usable screenshot.
    #[error(transparent)]
    Capture(#[from] CaptureError),

    // ── Image processing ──────────────────────────────────────────────────
    /// Decoding, resampling, or PNG encoding failed.
    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    /// Could not write the final image to its destination.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (panicked blocking task, runtime setup).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Short, stable name of the failure family, used in logs and as the
    /// fallback user-facing message.
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::InvalidRequest(_) => "invalid request",
            PipelineError::InvalidConfig(_) => "invalid configuration",
            PipelineError::Workspace { .. } => "work directory",
            PipelineError::Markdown(_) => "markdown conversion",
            PipelineError::Capture(_) => "screenshot capture",
            PipelineError::Image(_) => "image processing",
            PipelineError::OutputWriteFailed { .. } => "output write",
            PipelineError::Internal(_) => "internal",
        }
    }

    /// Whether the failure chain mentions TLS / certificate problems.
    pub fn is_certificate_related(&self) -> bool {
        let detail = format!("{self:?}").to_ascii_lowercase();
        detail.contains("certificate") || detail.contains("ssl") || detail.contains("tls")
    }
}

/// Failures of the out-of-process rendering surface.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No browser executable configured and none could be discovered.
    #[error("No rendering browser available: {0}")]
    BrowserNotFound(#[from] browser_locate::LocateError),

    /// The browser process could not be started.
    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The browser exited unsuccessfully.
    #[error("Renderer exited with status {code:?}: {stderr}")]
    Exited { code: Option<i32>, stderr: String },

    /// The surface did not answer before the capture deadline.
    #[error("Renderer did not finish within {after:?}")]
    Timeout { after: Duration },

    /// The surface reported success but returned no output path.
    #[error("Renderer '{surface}' returned no image path")]
    NoOutputPath { surface: String },

    /// The returned path does not exist or holds an empty file.
    #[error("Renderer did not produce an image file at '{path}'")]
    MissingOutput { path: PathBuf },

    /// The HTTP render service rejected the job or answered garbage.
    #[error("Render service error: {0}")]
    Service(String),

    /// Reading or writing capture files failed.
    #[error("Capture I/O failed for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A remote image could not be cached. Never leaves the cache layer.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, DNS, TLS, or body-read failure.
    #[error("Failed to download '{url}': {reason}")]
    Request { url: String, reason: String },

    /// The fixed request timeout elapsed.
    #[error("Download timed out after {secs}s for '{url}'")]
    Timeout { url: String, secs: u64 },

    /// Non-2xx response.
    #[error("Download of '{url}' returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The body could not be written into the cache directory.
    #[error("Failed to store cached image '{path}': {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
