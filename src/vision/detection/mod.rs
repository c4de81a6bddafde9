// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! YOLOv5 object detection
//!
//! Pipeline stages:
//! 1. `preprocessing` - letterbox to the model input, NCHW tensor
//! 2. `model` - ONNX Runtime forward pass
//! 3. `postprocessing` - threshold, class-aware NMS, map boxes back

pub mod labels;
pub mod model;
pub mod postprocessing;
pub mod preprocessing;

use thiserror::Error;

pub use labels::ClassNames;
pub use model::{
    DevicePreference, ExecutionDevice, InferenceBackend, ModelOptions, OnnxDetectionModel,
};
pub use postprocessing::{postprocess, BoundingBox, Detection, PostprocessConfig};
pub use preprocessing::{preprocess, LetterboxConfig, LetterboxParams, PreprocessedTensor};

/// Errors from the detector itself
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Invalid model input: {0}")]
    InvalidInput(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Unexpected model output: {0}")]
    UnexpectedOutput(String),

    #[error("Invalid class labels: {0}")]
    Labels(String),
}
