// src/engine/pipeline.rs
//
// Pipeline operations: target size calculation and SIMD resize with image crate fallback

use crate::engine::decoder::check_dimensions;
use crate::error::{BatchError, Result};
use crate::ops::ResizeMode;
use fast_image_resize::{self as fir, ImageBufferError, MulDiv, PixelType, ResizeOptions};
use image::{imageops::FilterType, DynamicImage, RgbImage, RgbaImage};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct ResizeError {
    pub source_dims: (u32, u32),
    pub target_dims: (u32, u32),
    pub reason: String,
}

impl ResizeError {
    pub fn new(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source_dims,
            target_dims,
            reason: reason.into(),
        }
    }

    pub fn into_batch_error(self) -> BatchError {
        BatchError::resize_failed(self.source_dims, self.target_dims, self.reason)
    }
}

/// Compute the output size for an image of `width` x `height`.
///
/// Scale factors are applied per axis and floored, so a small image scaled
/// down can land on zero. That is caught by [`resize_to_target`].
pub fn target_dimensions(width: u32, height: u32, mode: &ResizeMode) -> (u32, u32) {
    match *mode {
        ResizeMode::ScaleFactor(scale) => (scale_axis(width, scale), scale_axis(height, scale)),
        ResizeMode::Explicit { width, height } => (width, height),
    }
}

#[inline]
fn scale_axis(len: u32, scale: f64) -> u32 {
    // `as` saturates: NaN -> 0, overflow -> u32::MAX
    (len as f64 * scale).floor() as u32
}

/// Resize `img` according to `mode`.
///
/// Returns the image untouched when the target equals the source size.
/// Every failure, including a target outside the safety limits, is a
/// `ResizeFailed` error.
pub fn resize_to_target(img: DynamicImage, mode: &ResizeMode) -> Result<DynamicImage> {
    let source = (img.width(), img.height());
    let target = target_dimensions(source.0, source.1, mode);

    if target == source {
        return Ok(img);
    }
    if target.0 == 0 || target.1 == 0 {
        return Err(BatchError::resize_failed(
            source,
            target,
            "target size has a zero dimension",
        ));
    }
    check_dimensions(target.0, target.1)
        .map_err(|e| BatchError::resize_failed(source, target, e.to_string()))?;

    fast_resize_owned(img, target.0, target.1).map_err(ResizeError::into_batch_error)
}

/// Fast resize with owned DynamicImage (zero-copy for RGB/RGBA)
/// Returns Ok(resized) on success, Err(resize_error) on failure
pub fn fast_resize_owned(
    img: DynamicImage,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, ResizeError> {
    fast_resize_owned_impl(img, dst_width, dst_height, default_resize_options())
}

fn default_resize_options() -> ResizeOptions {
    ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3))
}

fn fast_resize_owned_impl(
    img: DynamicImage,
    dst_width: u32,
    dst_height: u32,
    options: ResizeOptions,
) -> std::result::Result<DynamicImage, ResizeError> {
    let src_width = img.width();
    let src_height = img.height();

    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err(ResizeError::new(
            (src_width, src_height),
            (dst_width, dst_height),
            "invalid dimensions for resize",
        ));
    }

    // Take ownership of RGB/RGBA buffers; everything else goes through RGBA
    let (pixel_type, src_pixels): (PixelType, Vec<u8>) = match img {
        DynamicImage::ImageRgb8(rgb) => (PixelType::U8x3, rgb.into_raw()),
        DynamicImage::ImageRgba8(rgba) => (PixelType::U8x4, rgba.into_raw()),
        luma @ DynamicImage::ImageLuma8(_) => (PixelType::U8x3, luma.to_rgb8().into_raw()),
        other => (PixelType::U8x4, other.to_rgba8().into_raw()),
    };

    resize_pixels(
        src_width, src_height, src_pixels, pixel_type, dst_width, dst_height, options,
    )
    .map_err(|reason| ResizeError::new((src_width, src_height), (dst_width, dst_height), reason))
}

/// Decide whether alpha premultiplication is required for a given pixel layout.
#[inline]
fn requires_premultiply(pixel_type: PixelType) -> bool {
    matches!(pixel_type, PixelType::U8x4)
}

fn resize_pixels(
    src_width: u32,
    src_height: u32,
    mut src_pixels: Vec<u8>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
    options: ResizeOptions,
) -> std::result::Result<DynamicImage, String> {
    let pixel_count = (src_width as usize)
        .checked_mul(src_height as usize)
        .ok_or_else(|| "image dimensions overflow during resize".to_string())?;
    let required_bytes = pixel_count
        .checked_mul(pixel_type.size())
        .ok_or_else(|| "image buffer size overflow during resize".to_string())?;

    if src_pixels.len() < required_bytes {
        return Err(format!(
            "source buffer too small: expected {required_bytes} bytes, got {}",
            src_pixels.len()
        ));
    }

    let primary_result = match fir::images::Image::from_slice_u8(
        src_width,
        src_height,
        src_pixels.as_mut_slice(),
        pixel_type,
    ) {
        Ok(src_image) => {
            resize_with_source_image(src_image, pixel_type, dst_width, dst_height, options)
        }
        Err(ImageBufferError::InvalidBufferAlignment) => {
            let aligned_image = copy_pixels_to_aligned_image(
                src_width,
                src_height,
                pixel_type,
                &src_pixels,
                required_bytes,
            )?;
            resize_with_source_image(aligned_image, pixel_type, dst_width, dst_height, options)
        }
        Err(other) => Err(format!("fir source image error: {other:?}")),
    };

    match primary_result {
        Ok(img) => Ok(img),
        Err(err) => {
            warn!(error = %err, "simd resize failed, using image crate fallback");
            resize_with_image_crate_fallback(
                &src_pixels,
                src_width,
                src_height,
                pixel_type,
                dst_width,
                dst_height,
            )
            .map_err(|fallback_err| format!("{err}; fallback failed: {fallback_err}"))
        }
    }
}

fn copy_pixels_to_aligned_image(
    width: u32,
    height: u32,
    pixel_type: PixelType,
    src_pixels: &[u8],
    required_bytes: usize,
) -> std::result::Result<fir::images::Image<'static>, String> {
    let mut aligned_image = fir::images::Image::new(width, height, pixel_type);
    let aligned_buffer = aligned_image.buffer_mut();
    if aligned_buffer.len() != required_bytes {
        return Err(format!(
            "aligned copy size mismatch: expected {required_bytes} bytes, got {}",
            aligned_buffer.len()
        ));
    }
    aligned_buffer.copy_from_slice(&src_pixels[..required_bytes]);
    debug!(width, height, "copied source pixels into aligned buffer");
    Ok(aligned_image)
}

fn resize_with_image_crate_fallback(
    src_pixels: &[u8],
    src_width: u32,
    src_height: u32,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<DynamicImage, String> {
    let filter = FilterType::Lanczos3;
    match pixel_type {
        PixelType::U8x3 => {
            let rgb = RgbImage::from_raw(src_width, src_height, src_pixels.to_vec())
                .ok_or_else(|| "failed to build rgb image for fallback resize".to_string())?;
            Ok(DynamicImage::ImageRgb8(image::imageops::resize(
                &rgb, dst_width, dst_height, filter,
            )))
        }
        PixelType::U8x4 => {
            let rgba = RgbaImage::from_raw(src_width, src_height, src_pixels.to_vec())
                .ok_or_else(|| "failed to build rgba image for fallback resize".to_string())?;
            Ok(DynamicImage::ImageRgba8(image::imageops::resize(
                &rgba, dst_width, dst_height, filter,
            )))
        }
        _ => Err("fallback resize supports only U8x3/U8x4 pixel types".to_string()),
    }
}

/// True when every alpha byte is 255. RGB is always opaque.
///
/// Below one megapixel the scan costs more than premultiplying, so small
/// RGBA images report `false` without looking.
fn is_fully_opaque(image: &fir::images::Image, pixel_type: PixelType) -> bool {
    if pixel_type != PixelType::U8x4 {
        return true;
    }

    const THRESHOLD_PIXELS: u64 = 1_000_000;
    if (image.width() as u64).saturating_mul(image.height() as u64) < THRESHOLD_PIXELS {
        return false;
    }

    image.buffer().iter().skip(3).step_by(4).all(|&alpha| alpha == 255)
}

fn resize_with_source_image(
    mut src_image: fir::images::Image<'_>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
    options: ResizeOptions,
) -> std::result::Result<DynamicImage, String> {
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, pixel_type);

    let needs_premultiply =
        requires_premultiply(pixel_type) && !is_fully_opaque(&src_image, pixel_type);

    let mul_div = MulDiv::default();
    if needs_premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
    }

    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    if needs_premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    let dst_pixels = dst_image.into_vec();
    match pixel_type {
        PixelType::U8x3 => {
            let rgb_image = RgbImage::from_raw(dst_width, dst_height, dst_pixels)
                .ok_or("failed to create rgb image from resized data")?;
            Ok(DynamicImage::ImageRgb8(rgb_image))
        }
        PixelType::U8x4 => {
            let rgba_image = RgbaImage::from_raw(dst_width, dst_height, dst_pixels)
                .ok_or("failed to create rgba image from resized data")?;
            Ok(DynamicImage::ImageRgba8(rgba_image))
        }
        _ => Err("unsupported pixel type after resize".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, GrayImage, Luma, Rgba};

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    #[test]
    fn test_target_dimensions_scale_floors() {
        let half = ResizeMode::ScaleFactor(0.5);
        assert_eq!(target_dimensions(100, 50, &half), (50, 25));
        assert_eq!(target_dimensions(101, 51, &half), (50, 25));
        assert_eq!(target_dimensions(1, 1, &half), (0, 0));
        assert_eq!(
            target_dimensions(10, 10, &ResizeMode::ScaleFactor(1.5)),
            (15, 15)
        );
    }

    #[test]
    fn test_target_dimensions_explicit_ignores_aspect() {
        let mode = ResizeMode::Explicit {
            width: 30,
            height: 7,
        };
        assert_eq!(target_dimensions(1000, 1000, &mode), (30, 7));
    }

    #[test]
    fn test_resize_to_target_scale() {
        let img = create_test_image(40, 20);
        let out = resize_to_target(img, &ResizeMode::ScaleFactor(0.5)).unwrap();
        assert_eq!(out.dimensions(), (20, 10));
    }

    #[test]
    fn test_resize_to_target_identity_keeps_pixels() {
        let img = create_test_image(9, 9);
        let expected = img.to_rgb8().into_raw();
        let out = resize_to_target(img, &ResizeMode::ScaleFactor(1.0)).unwrap();
        assert_eq!(out.to_rgb8().into_raw(), expected);
    }

    #[test]
    fn test_resize_to_target_zero_axis_fails() {
        let img = create_test_image(1, 1);
        let err = resize_to_target(img, &ResizeMode::ScaleFactor(0.5)).unwrap_err();
        assert!(matches!(
            err,
            BatchError::ResizeFailed {
                target_width: 0,
                target_height: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_resize_to_target_over_limit_is_resize_failure() {
        let img = create_test_image(2, 2);
        let mode = ResizeMode::Explicit {
            width: crate::engine::MAX_DIMENSION + 1,
            height: 1,
        };
        let err = resize_to_target(img, &mode).unwrap_err();
        assert!(matches!(err, BatchError::ResizeFailed { .. }));
    }

    #[test]
    fn test_fast_resize_owned_rgba_keeps_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 0])));
        let out = fast_resize_owned(img, 4, 4).unwrap();
        assert!(matches!(out, DynamicImage::ImageRgba8(_)));
        assert_eq!(out.dimensions(), (4, 4));
    }

    #[test]
    fn test_fast_resize_owned_grayscale_goes_through_rgb() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(6, 6, Luma([200])));
        let out = fast_resize_owned(img, 3, 2).unwrap();
        assert!(matches!(out, DynamicImage::ImageRgb8(_)));
        assert_eq!(out.dimensions(), (3, 2));
    }

    #[test]
    fn test_fast_resize_owned_rejects_zero_target() {
        let err = fast_resize_owned(create_test_image(4, 4), 0, 4).unwrap_err();
        assert_eq!(err.source_dims, (4, 4));
        assert_eq!(err.target_dims, (0, 4));
    }

    #[test]
    fn test_fallback_resize_matches_requested_size() {
        let img = create_test_image(10, 10);
        let raw = img.to_rgb8().into_raw();
        let out = resize_with_image_crate_fallback(&raw, 10, 10, PixelType::U8x3, 5, 3).unwrap();
        assert_eq!(out.dimensions(), (5, 3));
    }
}
