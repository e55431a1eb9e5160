//! Helpers for exporting rendered images in transport-safe encodings.
//!
//! This module centralizes PNG encoding and base64 conversion so the
//! pipeline and the CLI share a single implementation.

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::{ExtendedColorType, ImageEncoder, RgbImage, codecs::png::PngEncoder};

/// Encode an RGB image into an in-memory PNG buffer.
pub fn encode_rgb_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let encoder = PngEncoder::new(&mut bytes);
    encoder
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .context("failed to encode PNG")?;
    Ok(bytes)
}

/// Convert encoded image bytes into a standard base64 string suitable for
/// direct embedding in a response body.
pub fn png_to_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}
