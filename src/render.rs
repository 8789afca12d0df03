//! Render entry points: Markdown in, cropped PNG out.
//!
//! Every public function funnels into one private pipeline run and converts
//! its [`PipelineError`] into the single public [`RenderError`] at the
//! boundary, after logging the category and full detail.

use crate::config::{RenderConfig, RenderRequest};
use crate::error::{PipelineError, RenderError};
use crate::pipeline::cache::{HttpFetcher, ImageCache, ImageFetcher};
use crate::pipeline::capture::{resolve_surface, CaptureEngine, ScalePlan};
use crate::pipeline::document::DocumentBuilder;
use crate::pipeline::encode::to_base64_uri;
use crate::pipeline::height::{resolve_height, seed_height, HeightLimits};
use crate::pipeline::postprocess;
use crate::workspace::{clean_up_dir, Workspace};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Render Markdown to PNG bytes.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// Returns `Err(RenderError)` when the page could not be captured or
/// encoded. Image download failures are not errors: the affected images
/// are left for the browser to load.
pub async fn render_markdown_to_image_bytes(
    request: &RenderRequest,
    config: &RenderConfig,
) -> Result<Vec<u8>, RenderError> {
    run(request, config).await.map_err(report)
}

/// Render Markdown to `"base64://<png>"`, the inline-image form chat
/// adapters accept.
pub async fn render_markdown_to_base64(
    request: &RenderRequest,
    config: &RenderConfig,
) -> Result<String, RenderError> {
    let png = render_markdown_to_image_bytes(request, config).await?;
    Ok(to_base64_uri(&png))
}

/// Render Markdown and write the PNG to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
/// Returns the number of bytes written.
pub async fn render_to_file(
    request: &RenderRequest,
    output_path: impl AsRef<Path>,
    config: &RenderConfig,
) -> Result<usize, RenderError> {
    let png = render_markdown_to_image_bytes(request, config).await?;
    let path = output_path.as_ref();
    write_atomically(path, &png).await.map_err(report)?;
    Ok(png.len())
}

/// Synchronous wrapper around [`render_markdown_to_image_bytes`].
///
/// Creates a temporary tokio runtime internally; do not call from inside
/// an async context.
pub fn render_sync(request: &RenderRequest, config: &RenderConfig) -> Result<Vec<u8>, RenderError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| {
            report(PipelineError::Internal(format!(
                "Failed to create tokio runtime: {}",
                e
            )))
        })?
        .block_on(render_markdown_to_image_bytes(request, config))
}

/// Remove leftover temp screenshots and pages from the work directory.
///
/// Returns how many files were deleted. The image cache is never touched.
pub fn clean_up(config: &RenderConfig) -> usize {
    let dir = config.resolved_work_dir();
    let removed = clean_up_dir(&dir);
    info!("Cleaned up {} temp file(s) in {}", removed, dir.display());
    removed
}

// ── Internal ─────────────────────────────────────────────────────────────

fn report(err: PipelineError) -> RenderError {
    error!("Markdown render failed [{}]: {}", err.category(), err);
    debug!("Failure detail: {:?}", err);
    RenderError::from_pipeline(err)
}

fn resolve_fetcher(config: &RenderConfig) -> Result<Arc<dyn ImageFetcher>, PipelineError> {
    if let Some(fetcher) = &config.image_fetcher {
        return Ok(Arc::clone(fetcher));
    }
    let http = HttpFetcher::new(config.image_timeout_secs)
        .map_err(|e| PipelineError::Internal(format!("Failed to build HTTP client: {}", e)))?;
    Ok(Arc::new(http))
}

async fn run(request: &RenderRequest, config: &RenderConfig) -> Result<Vec<u8>, PipelineError> {
    let start = Instant::now();
    request.validate()?;
    let width = request.effective_width();

    // ── Step 1: Work directory + temp names ─────────────────────────────
    let workspace = Workspace::prepare(config.resolved_work_dir())?;
    // Dropped on every exit path, which removes both files.
    let temp = workspace.temp_files();

    // ── Step 2: Build the HTML page ─────────────────────────────────────
    let cache = ImageCache::new(workspace.image_cache_dir(), resolve_fetcher(config)?);
    let font = request
        .font_path
        .as_deref()
        .or(config.font_path.as_deref());
    let document = DocumentBuilder::new(cache, config.disable_linkify, config.max_cached_images)
        .build(&request.markdown, font)
        .await?;
    tokio::fs::write(&temp.html, &document.html)
        .await
        .map_err(|source| PipelineError::Workspace {
            path: temp.html.clone(),
            source,
        })?;

    // ── Step 3: Pick the surface and negotiate scaling ──────────────────
    let surface = resolve_surface(config)?;
    let plan = ScalePlan::negotiate(request.zoom, surface.capabilities());
    debug!(
        "Surface '{}': device scale {:?}, post scale {}",
        surface.name(),
        plan.device_scale_factor,
        plan.post_scale_factor
    );
    let engine = CaptureEngine::new(
        surface,
        temp.html.clone(),
        document.html,
        temp.png.clone(),
        width,
        plan,
        Duration::from_secs(config.capture_timeout_secs),
    );

    // ── Step 4: Adaptive height search ──────────────────────────────────
    let seed = seed_height(&request.markdown, config.max_height);
    let progress = config.progress_callback.as_deref();
    if let Some(cb) = progress {
        cb.on_render_start(width, seed);
    }
    let limits = HeightLimits {
        max_height: config.max_height,
        margin_threshold: config.margin_threshold,
        max_attempts: config.max_attempts,
    };
    let attempt = resolve_height(&engine, seed, limits, progress).await?;

    // ── Step 5: Crop, scale, encode ─────────────────────────────────────
    let padding = config.vertical_padding;
    let png = tokio::task::spawn_blocking(move || {
        postprocess::finalize(attempt.image, attempt.content_bbox, padding, plan.post_scale_factor)
    })
    .await
    .map_err(|e| PipelineError::Internal(format!("Post-processing task panicked: {}", e)))??;

    if let Some(cb) = progress {
        cb.on_render_complete(png.len());
    }
    info!(
        "Rendered {} bytes markdown → {} bytes PNG in {}ms",
        request.markdown.len(),
        png.len(),
        start.elapsed().as_millis()
    );
    Ok(png)
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    let write_err = |source: std::io::Error| PipelineError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let tmp_path = path.with_extension("png.tmp");
    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}
