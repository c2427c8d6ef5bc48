// src/engine/encoder.rs
//
// Encoder operations: JPEG, PNG, GIF, BMP, TIFF through the image crate,
// with optional lossless PNG recompression.

use crate::engine::common::run_with_panic_policy;
use crate::error::{BatchError, Result};
use crate::ops::{EncodeSettings, OutputFormat};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// Encode `img` as `format`, returning the file bytes.
pub fn encode(img: &DynamicImage, format: OutputFormat, settings: &EncodeSettings) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Jpeg => encode_jpeg(img, settings.jpeg_quality),
        OutputFormat::Png => encode_png(img, settings.optimize_png),
        other => encode_with_image_crate(img, other),
    }
}

/// Encode to JPEG at `quality` (clamped to 1-100).
///
/// JPEG has no alpha channel; transparent pixels are flattened by dropping alpha.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
        let mut buf = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
        rgb.write_with_encoder(encoder)
            .map_err(|e| BatchError::encode_failed("jpeg", format!("JPEG encode failed: {e}")))?;
        Ok(buf)
    })
}

/// Encode to PNG using image crate, optionally recompressed with oxipng.
pub fn encode_png(img: &DynamicImage, optimize: bool) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| BatchError::encode_failed("png", format!("PNG encode failed: {e}")))?;

        if !optimize {
            return Ok(buf);
        }

        let mut options = oxipng::Options::from_preset(4);
        // Keep ancillary chunks as written by the encoder
        options.strip = oxipng::StripChunks::None;

        oxipng::optimize_from_memory(&buf, &options).map_err(|e| {
            BatchError::encode_failed("png", format!("oxipng optimization failed: {e}"))
        })
    })
}

/// GIF, BMP and TIFF go straight through the image crate.
///
/// Pixel layouts are normalized first: GIF wants RGBA, the others get
/// RGB or RGBA depending on whether the source has alpha.
fn encode_with_image_crate(img: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>> {
    let context = format!("encode:{}", format.extension());
    run_with_panic_policy(&context, || {
        let normalized = match format {
            OutputFormat::Gif => DynamicImage::ImageRgba8(img.to_rgba8()),
            _ if img.color().has_alpha() => DynamicImage::ImageRgba8(img.to_rgba8()),
            _ => DynamicImage::ImageRgb8(img.to_rgb8()),
        };

        let mut buf = Vec::new();
        normalized
            .write_to(&mut Cursor::new(&mut buf), format.image_format())
            .map_err(|e| {
                BatchError::encode_failed(format.extension(), format!("{format} encode failed: {e}"))
            })?;
        Ok(buf)
    })
}
