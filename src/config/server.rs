// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{bail, Result};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::api::DEFAULT_MAX_UPLOAD_BYTES;
use crate::vision::detection::postprocessing::{
    DEFAULT_CONF_THRESHOLD, DEFAULT_IOU_THRESHOLD, DEFAULT_MAX_DETECTIONS,
};
use crate::vision::detection::preprocessing::{DEFAULT_STRIDE, DETECTION_INPUT_SIZE};
use crate::vision::detection::{
    DevicePreference, LetterboxConfig, ModelOptions, PostprocessConfig,
};

/// Waste Detector HTTP node
///
/// Every option can also be set through the environment (or a `.env` file).
#[derive(Parser, Debug, Clone)]
#[command(name = "waste-detector")]
#[command(version = crate::version::VERSION_NUMBER)]
#[command(about = "Object detection over HTTP with a YOLOv5 ONNX model", long_about = None)]
pub struct ServerArgs {
    /// Address to listen on
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "API_PORT", default_value_t = 5000)]
    pub port: u16,

    /// YOLOv5 model exported to ONNX
    #[arg(long, env = "MODEL_PATH", default_value = "./models/best.onnx")]
    pub model_path: PathBuf,

    /// Labels file, one class name per line (overrides model metadata)
    #[arg(long, env = "LABELS_PATH")]
    pub labels: Option<PathBuf>,

    /// Execution provider
    #[arg(long, env = "DEVICE", value_enum, default_value_t = DevicePreference::Auto)]
    pub device: DevicePreference,

    /// ONNX Runtime intra-op threads
    #[arg(long, env = "ORT_INTRA_THREADS", default_value_t = 4)]
    pub intra_threads: usize,

    /// Square model input size
    #[arg(long, env = "INPUT_SIZE", default_value_t = DETECTION_INPUT_SIZE)]
    pub input_size: u32,

    /// Model stride; defaults to the model's `stride` metadata, then 32
    #[arg(long, env = "MODEL_STRIDE")]
    pub stride: Option<u32>,

    /// Pad only to the next stride multiple instead of the full square
    #[arg(long, env = "LETTERBOX_AUTO")]
    pub letterbox_auto: bool,

    /// Minimum confidence for a detection
    #[arg(long, env = "CONF_THRESHOLD", default_value_t = DEFAULT_CONF_THRESHOLD)]
    pub conf_threshold: f32,

    /// IoU above which same-class boxes are suppressed
    #[arg(long, env = "IOU_THRESHOLD", default_value_t = DEFAULT_IOU_THRESHOLD)]
    pub iou_threshold: f32,

    /// Maximum detections per image
    #[arg(long, env = "MAX_DETECTIONS", default_value_t = DEFAULT_MAX_DETECTIONS)]
    pub max_detections: usize,

    /// Directory annotated results are written to and served from
    #[arg(long, env = "RESULTS_DIR", default_value = "static/results")]
    pub results_dir: PathBuf,

    /// Maximum request body size in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,
}

impl ServerArgs {
    /// Reject option combinations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.conf_threshold) {
            bail!("conf-threshold must be within [0, 1], got {}", self.conf_threshold);
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            bail!("iou-threshold must be within [0, 1], got {}", self.iou_threshold);
        }
        if self.max_detections == 0 {
            bail!("max-detections must be at least 1");
        }
        if self.intra_threads == 0 {
            bail!("intra-threads must be at least 1");
        }
        if self.max_upload_bytes == 0 {
            bail!("max-upload-bytes must be at least 1");
        }
        if let Some(stride) = self.stride {
            check_input_geometry(self.input_size, stride)?;
        } else if self.input_size == 0 {
            bail!("input-size must be positive");
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Explicit `--stride`, else the model's metadata, else 32
    pub fn resolve_stride(&self, metadata_stride: Option<u32>) -> u32 {
        self.stride.or(metadata_stride).unwrap_or(DEFAULT_STRIDE)
    }

    pub fn letterbox_config(&self, stride: u32) -> LetterboxConfig {
        LetterboxConfig {
            target_size: self.input_size,
            stride,
            auto: self.letterbox_auto,
        }
    }

    pub fn postprocess_config(&self) -> PostprocessConfig {
        PostprocessConfig {
            conf_threshold: self.conf_threshold,
            iou_threshold: self.iou_threshold,
            max_detections: self.max_detections,
        }
    }

    pub fn model_options(&self) -> ModelOptions {
        ModelOptions {
            device: self.device,
            intra_threads: self.intra_threads,
        }
    }
}

/// Input size must be a positive multiple of a non-zero stride
pub fn check_input_geometry(input_size: u32, stride: u32) -> Result<()> {
    if stride == 0 {
        bail!("stride must be positive");
    }
    if input_size == 0 || input_size % stride != 0 {
        bail!(
            "input-size {} must be a positive multiple of the stride {}",
            input_size,
            stride
        );
    }
    Ok(())
}
