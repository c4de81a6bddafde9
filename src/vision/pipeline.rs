// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! End-to-end detection for one uploaded image
//!
//! decode -> letterbox -> forward -> NMS/rescale -> annotate -> persist

use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

use super::annotate::Annotator;
use super::detection::{
    postprocess, preprocess, ClassNames, Detection, DetectionError, InferenceBackend,
    LetterboxConfig, PostprocessConfig,
};
use super::image_utils::{decode_image_bytes, ImageError, ImageInfo};
use crate::results::{ResultArtifact, ResultStore, StoreError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid image: {0}")]
    Image(#[from] ImageError),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    /// Ordered by confidence, highest first
    pub detections: Vec<Detection>,
    pub artifact: ResultArtifact,
    pub image_info: ImageInfo,
    pub processing_time_ms: u64,
}

/// Everything a request needs, built once at start-up and shared read-only
pub struct DetectionPipeline {
    backend: Arc<dyn InferenceBackend>,
    class_names: ClassNames,
    letterbox: LetterboxConfig,
    postprocess: PostprocessConfig,
    annotator: Annotator,
    store: ResultStore,
}

impl std::fmt::Debug for DetectionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionPipeline")
            .field("classes", &self.class_names.len())
            .field("letterbox", &self.letterbox)
            .field("postprocess", &self.postprocess)
            .field("results_dir", &self.store.dir())
            .finish_non_exhaustive()
    }
}

impl DetectionPipeline {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        class_names: ClassNames,
        annotator: Annotator,
        store: ResultStore,
    ) -> Self {
        Self {
            backend,
            class_names,
            letterbox: LetterboxConfig::default(),
            postprocess: PostprocessConfig::default(),
            annotator,
            store,
        }
    }

    pub fn with_letterbox(mut self, letterbox: LetterboxConfig) -> Self {
        self.letterbox = letterbox;
        self
    }

    pub fn with_postprocess(mut self, postprocess: PostprocessConfig) -> Self {
        self.postprocess = postprocess;
        self
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Run the whole pipeline on raw upload bytes.
    ///
    /// Blocking: call from a blocking worker, not an async task.
    pub fn run(&self, bytes: &[u8]) -> Result<DetectionOutcome, PipelineError> {
        let start = Instant::now();

        let (mut image, image_info) = decode_image_bytes(bytes)?;
        debug!(
            "Decoded {}x{} {:?} ({} bytes) in {:?}",
            image_info.width,
            image_info.height,
            image_info.format,
            image_info.size_bytes,
            start.elapsed()
        );

        let stage = Instant::now();
        let input = preprocess(&image, &self.letterbox);
        debug!(
            "Letterboxed to {}x{} (gain {:.4}) in {:?}",
            input.letterbox.input_width,
            input.letterbox.input_height,
            input.letterbox.gain,
            stage.elapsed()
        );

        let stage = Instant::now();
        let output = self.backend.forward(&input.tensor)?;
        debug!("Forward pass {:?} in {:?}", output.shape(), stage.elapsed());

        let stage = Instant::now();
        let detections = postprocess(
            &output.view(),
            &input.letterbox,
            &self.class_names,
            &self.postprocess,
        )?;
        debug!("{} detections after NMS in {:?}", detections.len(), stage.elapsed());

        self.annotator.draw(&mut image, &detections);
        let artifact = self.store.persist(&image)?;

        Ok(DetectionOutcome {
            detections,
            artifact,
            image_info,
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}
