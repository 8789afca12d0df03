//! Adaptive height resolver.
//!
//! A headless screenshot only contains what fits in the viewport, and the
//! rendered height of a page is unknown before it is rendered. The resolver
//! starts from an estimate and grows the viewport until the capture shows an
//! empty band at the bottom, meaning nothing was cut off.
//!
//! ```text
//! seed = max(lines·20 + fenced_blocks·200, 800)        (≤ max_height)
//!   │
//!   ▼
//! capture(h) ──▶ bbox ──▶ empty?           ──▶ stop
//!   ▲                     margin > 120 px? ──▶ stop
//!   │                     h ≥ max_height?  ──▶ stop
//!   │                     attempts ≥ 6?    ──▶ stop
//!   └── h ×2 (first two growths), ×1.5 after ◀┘
//! ```

use crate::error::PipelineError;
use crate::pipeline::capture::Capture;
use crate::progress::RenderProgressCallback;
use image::DynamicImage;
use tracing::{debug, info};

/// Minimum seed height in CSS pixels.
pub const MIN_SEED_HEIGHT: u32 = 800;
/// Estimated height per Markdown line.
pub const PX_PER_LINE: u32 = 20;
/// Extra estimate per fenced code block.
pub const PX_PER_FENCED_BLOCK: u32 = 200;

/// Region of an image that holds content. `right` and `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

/// Limits of the search.
#[derive(Debug, Clone, Copy)]
pub struct HeightLimits {
    pub max_height: u32,
    pub margin_threshold: u32,
    pub max_attempts: u32,
}

/// The capture the search settled on.
#[derive(Debug, Clone)]
pub struct CaptureAttempt {
    pub viewport_height: u32,
    pub image: DynamicImage,
    pub content_bbox: Option<BoundingBox>,
    pub attempts: u32,
}

impl CaptureAttempt {
    /// Empty image rows below the content, `None` for a blank capture.
    pub fn bottom_margin(&self) -> Option<u32> {
        self.content_bbox
            .map(|b| self.image.height().saturating_sub(b.bottom))
    }
}

/// Number of fenced code blocks: every line starting (after indentation)
/// with a backtick fence counts as half a block, rounded up.
pub fn count_fenced_blocks(markdown: &str) -> u32 {
    let fences = markdown
        .split('\n')
        .filter(|line| line.trim_start().starts_with("```"))
        .count() as u32;
    fences.div_ceil(2)
}

/// Initial viewport height estimate, capped at `max_height`.
pub fn seed_height(markdown: &str, max_height: u32) -> u32 {
    let lines = markdown.split('\n').count() as u32;
    let estimate = lines
        .saturating_mul(PX_PER_LINE)
        .saturating_add(count_fenced_blocks(markdown).saturating_mul(PX_PER_FENCED_BLOCK));
    estimate.max(MIN_SEED_HEIGHT).min(max_height)
}

/// Viewport height after `completed` captures.
pub fn next_height(current: u32, completed: u32, max_height: u32) -> u32 {
    let factor = if completed < 3 { 2.0 } else { 1.5 };
    ((current as f64 * factor) as u32).min(max_height)
}

/// Bounding box of the content of `img`.
///
/// Images with real transparency use the alpha channel (non-transparent
/// pixels are content). Opaque images, including RGBA images whose alpha is
/// 255 everywhere, count every pixel that differs from the top-left pixel.
pub fn content_bbox(img: &DynamicImage) -> Option<BoundingBox> {
    let rgba = img.to_rgba8();
    let has_transparency = img.color().has_alpha() && rgba.pixels().any(|p| p.0[3] < 255);

    let background = *rgba.get_pixel_checked(0, 0)?;
    let is_content = |p: &image::Rgba<u8>| {
        if has_transparency {
            p.0[3] != 0
        } else {
            *p != background
        }
    };

    let mut bbox: Option<BoundingBox> = None;
    for (x, y, p) in rgba.enumerate_pixels() {
        if !is_content(p) {
            continue;
        }
        bbox = Some(match bbox {
            None => BoundingBox {
                left: x,
                top: y,
                right: x + 1,
                bottom: y + 1,
            },
            Some(b) => BoundingBox {
                left: b.left.min(x),
                top: b.top.min(y),
                right: b.right.max(x + 1),
                bottom: b.bottom.max(y + 1),
            },
        });
    }
    bbox
}

/// Grow the viewport from `seed` until the content fits or a limit is hit.
///
/// Capture errors abort the search and propagate unchanged.
pub async fn resolve_height(
    capture: &dyn Capture,
    seed: u32,
    limits: HeightLimits,
    progress: Option<&dyn RenderProgressCallback>,
) -> Result<CaptureAttempt, PipelineError> {
    let mut height = seed.clamp(1, limits.max_height.max(1));
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if let Some(cb) = progress {
            cb.on_capture_start(attempts, height);
        }

        let image = capture.capture(height).await?;
        let (image, content_bbox) = tokio::task::spawn_blocking(move || {
            let bbox = content_bbox(&image);
            (image, bbox)
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("bbox task panicked: {}", e)))?;

        let state = CaptureAttempt {
            viewport_height: height,
            image,
            content_bbox,
            attempts,
        };
        let margin = state.bottom_margin();
        if let Some(cb) = progress {
            cb.on_capture_complete(attempts, height, margin);
        }
        debug!(
            "Attempt {}: viewport {}px, image {}px, bottom margin {:?}",
            attempts,
            height,
            state.image.height(),
            margin
        );

        let fits = match margin {
            None => true,
            Some(m) => m > limits.margin_threshold,
        };
        if fits || height >= limits.max_height || attempts >= limits.max_attempts {
            info!(
                "Settled on {}px viewport after {} capture(s)",
                height, attempts
            );
            return Ok(state);
        }

        height = next_height(height, attempts, limits.max_height);
    }
}
