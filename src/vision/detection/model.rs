// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! YOLOv5 ONNX detector
//!
//! Loads an exported YOLOv5 model with ONNX Runtime. CUDA is tried first
//! when allowed, falling back to the CPU provider. Class names and stride
//! are read from the metadata the YOLOv5 exporter embeds in the model.

use anyhow::{Context, Result};
use ndarray::{Array4, ArrayD};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::labels::ClassNames;
use super::postprocessing::class_count;
use super::DetectionError;

/// Anything that turns a `[1, 3, H, W]` tensor into YOLOv5 predictions.
///
/// The HTTP layer only sees this trait, so tests can swap in a canned
/// backend without a model on disk.
pub trait InferenceBackend: Send + Sync {
    /// Run one forward pass, returning the `[1, N, 5 + classes]` prediction tensor
    fn forward(&self, input: &Array4<f32>) -> Result<ArrayD<f32>, DetectionError>;
}

/// Which execution provider the operator asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DevicePreference {
    /// CUDA if it initialises, otherwise CPU
    #[default]
    Auto,
    Cpu,
    /// CUDA or fail
    Cuda,
}

/// Execution provider actually in use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionDevice {
    Cpu,
    Cuda,
}

impl fmt::Display for ExecutionDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionDevice::Cpu => write!(f, "cpu"),
            ExecutionDevice::Cuda => write!(f, "cuda"),
        }
    }
}

/// Options for building the ONNX Runtime session
#[derive(Debug, Clone, Copy)]
pub struct ModelOptions {
    pub device: DevicePreference,
    pub intra_threads: usize,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            device: DevicePreference::Auto,
            intra_threads: 4,
        }
    }
}

/// YOLOv5 detector backed by an ONNX Runtime session
#[derive(Clone)]
pub struct OnnxDetectionModel {
    /// Session::run needs `&mut`, so calls are serialised
    session: Arc<Mutex<Session>>,
    input_name: String,
    device: ExecutionDevice,
    /// `names` from model metadata, if present and parseable
    metadata_names: Option<ClassNames>,
    /// `stride` from model metadata, if present
    metadata_stride: Option<u32>,
}

impl fmt::Debug for OnnxDetectionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxDetectionModel")
            .field("input_name", &self.input_name)
            .field("device", &self.device)
            .field("metadata_classes", &self.metadata_names.as_ref().map(|n| n.len()))
            .field("metadata_stride", &self.metadata_stride)
            .finish_non_exhaustive()
    }
}

impl OnnxDetectionModel {
    /// Load the detector from an `.onnx` file
    ///
    /// # Errors
    /// Returns error if:
    /// - Model file not found
    /// - CUDA was forced and is unavailable
    /// - ONNX Runtime cannot build a session from the file
    pub fn load<P: AsRef<Path>>(model_path: P, options: &ModelOptions) -> Result<Self> {
        let model_path = model_path.as_ref();

        if !model_path.exists() {
            anyhow::bail!("Detection model not found: {}", model_path.display());
        }

        info!("Loading detection model from {}", model_path.display());

        let (session, device) = match options.device {
            DevicePreference::Cpu => (
                build_session(model_path, ExecutionDevice::Cpu, options.intra_threads)?,
                ExecutionDevice::Cpu,
            ),
            DevicePreference::Cuda => (
                build_session(model_path, ExecutionDevice::Cuda, options.intra_threads)
                    .context("CUDA execution provider was requested but failed")?,
                ExecutionDevice::Cuda,
            ),
            DevicePreference::Auto => {
                info!("   Attempting CUDA execution provider...");
                match build_session(model_path, ExecutionDevice::Cuda, options.intra_threads) {
                    Ok(session) => (session, ExecutionDevice::Cuda),
                    Err(e) => {
                        warn!("CUDA execution provider failed: {:#}", e);
                        warn!("   Falling back to CPU execution provider");
                        (
                            build_session(model_path, ExecutionDevice::Cpu, options.intra_threads)?,
                            ExecutionDevice::Cpu,
                        )
                    }
                }
            }
        };

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "images".to_string());

        if let Some(input) = session.inputs.first() {
            debug!("Detection model input {}: {:?}", input_name, input.input_type);
        }

        let metadata_names = match read_custom_metadata(&session, "names") {
            Some(raw) => match ClassNames::from_metadata(&raw) {
                Ok(names) => Some(names),
                Err(e) => {
                    warn!("Ignoring model names metadata: {}", e);
                    None
                }
            },
            None => None,
        };

        let metadata_stride = read_custom_metadata(&session, "stride")
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .filter(|stride| *stride > 0);

        info!(
            "✅ Detection model loaded on {} (classes in metadata: {})",
            device,
            metadata_names
                .as_ref()
                .map(|n| n.len().to_string())
                .unwrap_or_else(|| "none".to_string())
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            device,
            metadata_names,
            metadata_stride,
        })
    }

    pub fn device(&self) -> ExecutionDevice {
        self.device
    }

    /// Class names embedded by the exporter
    pub fn metadata_names(&self) -> Option<&ClassNames> {
        self.metadata_names.as_ref()
    }

    /// Stride embedded by the exporter
    pub fn metadata_stride(&self) -> Option<u32> {
        self.metadata_stride
    }

    /// Run one pass on a blank input and return the number of classes
    ///
    /// Catches models whose output does not look like YOLOv5 before the
    /// server starts accepting uploads.
    pub fn warm_up(&self, input_size: u32) -> Result<usize, DetectionError> {
        let size = input_size as usize;
        let input = Array4::<f32>::zeros((1, 3, size, size));
        let output = self.forward(&input)?;
        let classes = class_count(&output.view())?;
        debug!(
            "Warm-up output shape {:?} ({} classes)",
            output.shape(),
            classes
        );
        Ok(classes)
    }
}

impl InferenceBackend for OnnxDetectionModel {
    fn forward(&self, input: &Array4<f32>) -> Result<ArrayD<f32>, DetectionError> {
        let shape = input.shape();
        if shape.len() != 4 || shape[0] != 1 || shape[1] != 3 {
            return Err(DetectionError::InvalidInput(format!(
                "expected [1, 3, H, W], got {:?}",
                shape
            )));
        }

        let input_value = Value::from_array(input.to_owned())
            .map_err(|e| DetectionError::Inference(format!("failed to create input tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectionError::Inference("session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_value])
            .map_err(|e| DetectionError::Inference(e.to_string()))?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| DetectionError::UnexpectedOutput(e.to_string()))?
            .to_owned();

        Ok(output)
    }
}

fn build_session(
    model_path: &Path,
    device: ExecutionDevice,
    intra_threads: usize,
) -> Result<Session> {
    let provider = match device {
        ExecutionDevice::Cuda => CUDAExecutionProvider::default().build().error_on_failure(),
        ExecutionDevice::Cpu => CPUExecutionProvider::default().build(),
    };

    Session::builder()
        .context("Failed to create session builder")?
        .with_execution_providers([provider])
        .context(format!("Failed to set {} execution provider", device))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(intra_threads)
        .context("Failed to set intra threads")?
        .commit_from_file(model_path)
        .context(format!(
            "Failed to load detection model from {}",
            model_path.display()
        ))
}

fn read_custom_metadata(session: &Session, key: &str) -> Option<String> {
    match session.metadata() {
        Ok(metadata) => metadata.custom(key).ok().flatten(),
        Err(e) => {
            debug!("Model metadata unavailable: {}", e);
            None
        }
    }
}
