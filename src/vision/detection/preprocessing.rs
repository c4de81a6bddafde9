// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Letterbox preprocessing for the YOLOv5 detector

use image::{imageops, Rgb, RgbImage};
use ndarray::Array4;

/// Default square input size of the detector
pub const DETECTION_INPUT_SIZE: u32 = 640;

/// Default stride of the detector's coarsest feature map
pub const DEFAULT_STRIDE: u32 = 32;

/// Grey used for letterbox padding
pub const PAD_VALUE: u8 = 114;

/// How an image is fitted into the model input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxConfig {
    /// Side of the square model input
    pub target_size: u32,
    /// Model stride; padding is aligned to it in `auto` mode
    pub stride: u32,
    /// Pad only up to the next stride multiple instead of the full square
    pub auto: bool,
}

impl Default for LetterboxConfig {
    fn default() -> Self {
        Self {
            target_size: DETECTION_INPUT_SIZE,
            stride: DEFAULT_STRIDE,
            auto: false,
        }
    }
}

/// Parameters of an applied letterbox, needed to map boxes back
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxParams {
    /// Resize gain (new / old)
    pub gain: f32,
    /// Horizontal padding on each side, before rounding
    pub pad_x: f32,
    /// Vertical padding on each side, before rounding
    pub pad_y: f32,
    pub original_width: u32,
    pub original_height: u32,
    pub input_width: u32,
    pub input_height: u32,
}

impl LetterboxParams {
    /// Map a point from model-input space back to original image space.
    ///
    /// The result is clamped to `[0, width] x [0, height]`.
    pub fn map_to_original(&self, x: f32, y: f32) -> (f32, f32) {
        let orig_x = (x - self.pad_x) / self.gain;
        let orig_y = (y - self.pad_y) / self.gain;
        (
            orig_x.clamp(0.0, self.original_width as f32),
            orig_y.clamp(0.0, self.original_height as f32),
        )
    }
}

/// Model-ready tensor together with the transform that produced it
#[derive(Debug, Clone)]
pub struct PreprocessedTensor {
    /// NCHW, RGB, values in [0, 1]
    pub tensor: Array4<f32>,
    pub letterbox: LetterboxParams,
}

/// Resize keeping aspect ratio and pad to the model input geometry.
pub fn letterbox(image: &RgbImage, config: &LetterboxConfig) -> (RgbImage, LetterboxParams) {
    let (orig_w, orig_h) = image.dimensions();
    let target = config.target_size as f32;

    let gain = (target / orig_h as f32).min(target / orig_w as f32);

    let new_w = ((orig_w as f32 * gain).round() as u32).clamp(1, config.target_size);
    let new_h = ((orig_h as f32 * gain).round() as u32).clamp(1, config.target_size);

    let mut dw = (config.target_size - new_w) as f32;
    let mut dh = (config.target_size - new_h) as f32;
    if config.auto && config.stride > 0 {
        dw %= config.stride as f32;
        dh %= config.stride as f32;
    }
    dw /= 2.0;
    dh /= 2.0;

    let resized;
    let content = if (new_w, new_h) != (orig_w, orig_h) {
        resized = imageops::resize(image, new_w, new_h, imageops::FilterType::Triangle);
        &resized
    } else {
        image
    };

    let top = (dh - 0.1).round().max(0.0) as u32;
    let bottom = (dh + 0.1).round().max(0.0) as u32;
    let left = (dw - 0.1).round().max(0.0) as u32;
    let right = (dw + 0.1).round().max(0.0) as u32;

    let input_width = left + new_w + right;
    let input_height = top + new_h + bottom;

    let mut padded = RgbImage::from_pixel(
        input_width,
        input_height,
        Rgb([PAD_VALUE, PAD_VALUE, PAD_VALUE]),
    );
    imageops::replace(&mut padded, content, left as i64, top as i64);

    let params = LetterboxParams {
        gain,
        pad_x: dw,
        pad_y: dh,
        original_width: orig_w,
        original_height: orig_h,
        input_width,
        input_height,
    };

    (padded, params)
}

/// Build the detector input for an image
///
/// Steps:
/// 1. Letterbox to the configured input geometry
/// 2. HWC -> CHW
/// 3. Scale u8 to [0, 1]
/// 4. Add the batch axis: [1, 3, H, W]
pub fn preprocess(image: &RgbImage, config: &LetterboxConfig) -> PreprocessedTensor {
    let (padded, letterbox) = letterbox(image, config);
    let (w, h) = padded.dimensions();

    let mut tensor = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
    for (x, y, pixel) in padded.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }

    PreprocessedTensor { tensor, letterbox }
}
