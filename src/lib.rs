// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod config;
pub mod results;
pub mod version;
pub mod vision;

// Re-export main types
pub use api::{create_app, start_server, AppState};
pub use config::ServerArgs;
pub use results::{ResultArtifact, ResultStore};
pub use vision::{
    ClassNames, Detection, DetectionOutcome, DetectionPipeline, InferenceBackend,
    OnnxDetectionModel, PipelineError,
};
