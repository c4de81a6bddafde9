// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision processing for the detection endpoint
//!
//! This module provides:
//! - Image decoding for uploads
//! - YOLOv5 object detection via ONNX Runtime
//! - Annotation of detections onto the uploaded image
//! - The request pipeline tying these together

pub mod annotate;
pub mod detection;
pub mod image_utils;
pub mod pipeline;

pub use annotate::Annotator;
pub use detection::{
    ClassNames, Detection, DetectionError, DevicePreference, ExecutionDevice, InferenceBackend,
    ModelOptions, OnnxDetectionModel,
};
pub use image_utils::{
    decode_image_bytes, detect_format, ImageError, ImageInfo, MAX_IMAGE_DIMENSION,
};
pub use pipeline::{DetectionOutcome, DetectionPipeline, PipelineError};
