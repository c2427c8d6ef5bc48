// src/engine/decoder.rs
//
// Decoder operations: map the source file, sniff the format, decode with the image crate.

use crate::engine::common::run_with_panic_policy;
use crate::error::{BatchError, Result};
use image::{DynamicImage, ImageFormat, ImageReader};
use memmap2::Mmap;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use crate::engine::{MAX_DIMENSION, MAX_PIXELS};

/// Map a source file read-only.
///
/// An empty file is reported as a decode failure: there is nothing to map.
pub fn map_file(path: &Path) -> Result<Mmap> {
    let display = path.display().to_string();
    let file = File::open(path).map_err(|e| BatchError::open_failed(display.clone(), e))?;
    let len = file
        .metadata()
        .map_err(|e| BatchError::open_failed(display.clone(), e))?
        .len();
    if len == 0 {
        return Err(BatchError::decode_failed("file is empty"));
    }

    // Safety: the input folder is not expected to change while a batch runs.
    // A file truncated underneath us may fault; that is the usual mmap contract.
    unsafe { Mmap::map(&file) }.map_err(|e| BatchError::open_failed(display, e))
}

/// Detect input format using magic bytes. Returns None if unknown.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Decode an in-memory image after checking its header dimensions.
pub fn decode_image(bytes: &[u8]) -> Result<(DynamicImage, ImageFormat)> {
    let format = detect_format(bytes)
        .ok_or_else(|| BatchError::decode_failed("unrecognized image format"))?;
    ensure_dimensions_safe(bytes)?;

    let img = run_with_panic_policy("decode:image", || {
        image::load_from_memory_with_format(bytes, format)
            .map_err(|e| BatchError::decode_failed(format!("{e}")))
    })?;

    // The header may lie; check what was actually produced.
    check_dimensions(img.width(), img.height())?;
    Ok((img, format))
}

/// Open, map and decode the file at `path`.
///
/// The mapping is dropped before returning; only the decoded pixels survive.
pub fn open_image(path: &Path) -> Result<(DynamicImage, ImageFormat)> {
    let mmap = map_file(path)?;
    decode_image(&mmap)
}

/// Check if image dimensions are within safe limits.
/// Returns an error if the image is too large (potential decompression bomb).
pub fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(BatchError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(BatchError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}

/// Inspect encoded bytes and ensure the image dimensions are safe before decoding.
///
/// A header that cannot be read is let through; the decoder reports it properly.
pub fn ensure_dimensions_safe(bytes: &[u8]) -> Result<()> {
    let cursor = Cursor::new(bytes);
    if let Ok(reader) = ImageReader::new(cursor).with_guessed_format() {
        if let Ok((width, height)) = reader.into_dimensions() {
            return check_dimensions(width, height);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};
    use std::io::Write;

    fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 0]));
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buffer), format)
            .unwrap();
        buffer
    }

    #[test]
    fn test_ensure_dimensions_safe_allows_small_image() {
        let data = encode(64, 64, ImageFormat::Png);
        assert!(ensure_dimensions_safe(&data).is_ok());
    }

    #[test]
    fn test_ensure_dimensions_safe_rejects_large_image() {
        let width = MAX_DIMENSION + 1;
        let data = encode(width, 1, ImageFormat::Png);
        let err = ensure_dimensions_safe(&data).unwrap_err();
        assert!(matches!(err, BatchError::DimensionExceedsLimit { .. }));
    }

    #[test]
    fn test_check_dimensions_pixel_budget() {
        assert!(check_dimensions(10_000, 10_000).is_ok());
        let err = check_dimensions(20_000, 20_000).unwrap_err();
        assert!(matches!(err, BatchError::PixelCountExceedsLimit { .. }));
    }

    #[test]
    fn test_detect_format_by_magic_bytes() {
        assert_eq!(
            detect_format(&encode(2, 2, ImageFormat::Png)),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            detect_format(&encode(2, 2, ImageFormat::Jpeg)),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(
            detect_format(&encode(2, 2, ImageFormat::Bmp)),
            Some(ImageFormat::Bmp)
        );
        assert_eq!(detect_format(b"hello world"), None);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, BatchError::DecodeFailed { .. }));
    }

    #[test]
    fn test_decode_truncated_png_fails() {
        let data = encode(16, 16, ImageFormat::Png);
        let err = decode_image(&data[..data.len() / 2]).unwrap_err();
        assert!(matches!(err, BatchError::DecodeFailed { .. }));
    }

    #[test]
    fn test_open_image_ignores_misleading_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("really_a_png.jpg");
        std::fs::write(&path, encode(5, 3, ImageFormat::Png)).unwrap();

        let (img, format) = open_image(&path).unwrap();
        assert_eq!(format, ImageFormat::Png);
        assert_eq!(img.dimensions(), (5, 3));
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_image(&dir.path().join("nope.png")).unwrap_err();
        assert!(matches!(err, BatchError::OpenFailed { .. }));
    }

    #[test]
    fn test_open_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.png");
        std::fs::File::create(&path).unwrap().flush().unwrap();
        let err = open_image(&path).unwrap_err();
        assert!(matches!(err, BatchError::DecodeFailed { .. }));
    }
}
