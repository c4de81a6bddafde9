// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection response types

use serde::{Deserialize, Serialize};

use crate::vision::Detection;

/// One detected object as reported to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectedObject {
    /// Class label
    #[serde(rename = "class")]
    pub class_name: String,
    /// Confidence (0.0-1.0), 4 decimals
    pub confidence: f32,
}

impl From<&Detection> for DetectedObject {
    fn from(detection: &Detection) -> Self {
        Self {
            class_name: detection.class_name.clone(),
            confidence: detection.confidence,
        }
    }
}

/// Response from POST /detect
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectResponse {
    /// Highest confidence first
    pub detections: Vec<DetectedObject>,
    /// Where the annotated image can be fetched, `/results/<file>`
    pub image_url: String,
}

impl DetectResponse {
    pub fn new(detections: &[Detection], image_url: String) -> Self {
        Self {
            detections: detections.iter().map(DetectedObject::from).collect(),
            image_url,
        }
    }
}
