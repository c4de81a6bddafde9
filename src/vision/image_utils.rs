// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image loading for uploaded detection requests

use image::{ImageFormat, ImageReader, Limits, RgbImage};
use std::io::Cursor;
use thiserror::Error;

/// Largest accepted width or height of a decoded upload
pub const MAX_IMAGE_DIMENSION: u32 = 8192;

/// Errors raised while turning uploaded bytes into pixels
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Unsupported image format")]
    UnsupportedFormat,

    #[error("Failed to decode image: {0}")]
    DecodeFailed(String),

    #[error("Image data is empty")]
    EmptyData,

    #[error("Image has zero width or height")]
    ZeroSized,

    #[error("Image dimensions exceed {max}x{max}")]
    TooLarge { max: u32 },
}

/// Image information extracted during loading
#[derive(Debug, Clone)]
pub struct ImageInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Detected format
    pub format: ImageFormat,
    /// Size in bytes
    pub size_bytes: usize,
}

/// Decode raw image bytes (multipart uploads) into an RGB pixel grid
///
/// Every supported format is converted to 8-bit RGB; alpha is dropped.
/// Width and height are capped at [`MAX_IMAGE_DIMENSION`], checked from the
/// header before any pixels are allocated.
///
/// # Returns
/// * `Ok((RgbImage, ImageInfo))` - The decoded image and metadata
/// * `Err(ImageError)` - If the bytes are empty, of unknown format, too large, or corrupted
pub fn decode_image_bytes(bytes: &[u8]) -> Result<(RgbImage, ImageInfo), ImageError> {
    decode_image_bytes_with_limit(bytes, MAX_IMAGE_DIMENSION)
}

/// [`decode_image_bytes`] with an explicit dimension cap
pub fn decode_image_bytes_with_limit(
    bytes: &[u8],
    max_dimension: u32,
) -> Result<(RgbImage, ImageInfo), ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::EmptyData);
    }

    // Detect format from magic bytes
    let format = detect_format(bytes)?;

    let mut limits = Limits::default();
    limits.max_image_width = Some(max_dimension);
    limits.max_image_height = Some(max_dimension);

    let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
    reader.limits(limits);
    let img = reader.decode().map_err(|e| match e {
        image::ImageError::Limits(_) => ImageError::TooLarge { max: max_dimension },
        other => ImageError::DecodeFailed(other.to_string()),
    })?;

    if img.width() == 0 || img.height() == 0 {
        return Err(ImageError::ZeroSized);
    }

    let info = ImageInfo {
        width: img.width(),
        height: img.height(),
        format,
        size_bytes: bytes.len(),
    };

    Ok((img.to_rgb8(), info))
}

/// Detect image format from magic bytes
///
/// # Returns
/// * `Ok(ImageFormat)` - Detected format
/// * `Err(ImageError::UnsupportedFormat)` - If format cannot be detected
pub fn detect_format(bytes: &[u8]) -> Result<ImageFormat, ImageError> {
    if bytes.len() < 4 {
        return Err(ImageError::UnsupportedFormat);
    }

    match bytes {
        // PNG: 89 50 4E 47 (0x89 P N G)
        [0x89, 0x50, 0x4E, 0x47, ..] => Ok(ImageFormat::Png),

        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Ok(ImageFormat::Jpeg),

        // WebP: RIFF .... WEBP
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Ok(ImageFormat::WebP),

        // GIF: GIF87a or GIF89a
        [0x47, 0x49, 0x46, 0x38, x, ..] if *x == 0x37 || *x == 0x39 => Ok(ImageFormat::Gif),

        // BMP: BM
        [0x42, 0x4D, ..] => Ok(ImageFormat::Bmp),

        // TIFF: II (little-endian) or MM (big-endian)
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => Ok(ImageFormat::Tiff),

        _ => Err(ImageError::UnsupportedFormat),
    }
}
