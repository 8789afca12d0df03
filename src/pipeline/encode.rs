//! Image encoding: `DynamicImage` ⇄ PNG bytes, PNG → `base64://` URI.
//!
//! Chat adapters (OneBot and friends) accept images inline as
//! `base64://<payload>`, so the final PNG is offered in that form as well
//! as raw bytes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// URI scheme prefix understood by chat adapters for inline images.
pub const BASE64_URI_PREFIX: &str = "base64://";

/// Encode an image as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded {}x{} image → {} bytes PNG", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Decode a screenshot file's bytes, trusting the PNG signature.
pub fn decode_png(bytes: &[u8]) -> Result<DynamicImage, image::ImageError> {
    image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
}

/// `"base64://" + standard base64 (with padding) of the PNG bytes`.
pub fn to_base64_uri(png: &[u8]) -> String {
    let mut out = String::with_capacity(BASE64_URI_PREFIX.len() + png.len().div_ceil(3) * 4);
    out.push_str(BASE64_URI_PREFIX);
    STANDARD.encode_string(png, &mut out);
    out
}
