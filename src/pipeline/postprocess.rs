//! Post-processing: crop the final capture to its content and apply the
//! post-scale factor.
//!
//! Cropping removes the empty band the height search deliberately leaves
//! below the content (and any empty space above it), keeping
//! `vertical_padding` pixels on each side. Width is never cropped: the canvas
//! width is the layout width the caller asked for.
//!
//! Scaling only happens when the rendering surface could not honour the zoom
//! itself (see [`crate::pipeline::capture::ScalePlan`]).

use crate::pipeline::encode::encode_png;
use crate::pipeline::height::BoundingBox;
use image::{imageops::FilterType, DynamicImage};
use tracing::debug;

/// Crop, scale, and PNG-encode the final capture.
///
/// * `bbox` — content bounds from the height search; `None` keeps the whole image
/// * `padding` — pixels kept above the top and below the bottom of the content
/// * `post_scale` — resize factor; `1.0` skips resampling
pub fn finalize(
    image: DynamicImage,
    bbox: Option<BoundingBox>,
    padding: u32,
    post_scale: f64,
) -> Result<Vec<u8>, image::ImageError> {
    let cropped = crop_vertical(image, bbox, padding);
    let scaled = apply_scale(cropped, post_scale);
    encode_png(&scaled)
}

// ── Crop ──────────────────────────────────────────────────────────────────────

/// Vertical extent `[top, bottom)` kept for `bbox` in an image of `height` rows.
pub fn crop_rows(height: u32, bbox: Option<BoundingBox>, padding: u32) -> (u32, u32) {
    match bbox {
        Some(b) => (
            b.top.saturating_sub(padding),
            b.bottom.saturating_add(padding).min(height),
        ),
        None => (0, height),
    }
}

fn crop_vertical(image: DynamicImage, bbox: Option<BoundingBox>, padding: u32) -> DynamicImage {
    let (top, bottom) = crop_rows(image.height(), bbox, padding);
    if top == 0 && bottom >= image.height() {
        return image;
    }
    debug!(
        "Cropping rows {}..{} of {} (padding {})",
        top,
        bottom,
        image.height(),
        padding
    );
    image.crop_imm(0, top, image.width(), bottom.saturating_sub(top))
}

// ── Scale ─────────────────────────────────────────────────────────────────────

/// Target size `(max(1, floor(w*f)), max(1, floor(h*f)))`.
pub fn scaled_size(width: u32, height: u32, factor: f64) -> (u32, u32) {
    let scale = |v: u32| ((v as f64 * factor).floor() as u32).max(1);
    (scale(width), scale(height))
}

fn apply_scale(image: DynamicImage, factor: f64) -> DynamicImage {
    if factor == 1.0 {
        return image;
    }
    let (w, h) = scaled_size(image.width(), image.height(), factor);
    if (w, h) == (image.width(), image.height()) {
        return image;
    }
    debug!(
        "Resampling {}x{} → {}x{} (Lanczos3)",
        image.width(),
        image.height(),
        w,
        h
    );
    image.resize_exact(w, h, FilterType::Lanczos3)
}
