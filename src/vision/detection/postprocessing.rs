// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Decoding, non-max suppression and coordinate inversion for YOLOv5 output

use ndarray::{ArrayViewD, Axis, Ix3};
use std::cmp::Ordering;

use super::labels::ClassNames;
use super::preprocessing::LetterboxParams;
use super::DetectionError;

/// Default minimum confidence for a detection to be reported
pub const DEFAULT_CONF_THRESHOLD: f32 = 0.25;

/// Default IoU above which same-class boxes are suppressed
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Default cap on detections per image
pub const DEFAULT_MAX_DETECTIONS: usize = 300;

/// Cap on candidates fed into NMS
pub const MAX_NMS_CANDIDATES: usize = 30_000;

/// Box, objectness and at least one class score
const MIN_ROW_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostprocessConfig {
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            conf_threshold: DEFAULT_CONF_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            max_detections: DEFAULT_MAX_DETECTIONS,
        }
    }
}

/// A scored box in model-input space (x1, y1, x2, y2)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_id: usize,
}

/// Integer box in original image pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }
}

/// One detected object
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub class_name: String,
    /// Rounded to 4 decimals
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Number of classes encoded in a `[1, N, 5 + nc]` prediction tensor.
pub fn class_count(output: &ArrayViewD<f32>) -> Result<usize, DetectionError> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] != 1 || shape[2] < MIN_ROW_LEN {
        return Err(DetectionError::UnexpectedOutput(format!(
            "expected [1, N, 5 + classes], got {:?}",
            shape
        )));
    }
    Ok(shape[2] - 5)
}

/// Turn raw rows `(cx, cy, w, h, obj, cls...)` into candidates above the threshold.
///
/// Confidence is objectness times the best class score; the lowest class
/// index wins ties. A candidate exactly at the threshold is kept.
pub fn decode_predictions(
    output: &ArrayViewD<f32>,
    conf_threshold: f32,
) -> Result<Vec<Candidate>, DetectionError> {
    class_count(output)?;
    let rows = output
        .view()
        .into_dimensionality::<Ix3>()
        .map_err(|e| DetectionError::UnexpectedOutput(e.to_string()))?;
    let rows = rows.index_axis_move(Axis(0), 0);

    let mut candidates = Vec::new();
    for row in rows.axis_iter(Axis(0)) {
        let objectness = row[4];
        if objectness < conf_threshold {
            continue;
        }

        let (class_id, class_score) = row
            .iter()
            .skip(5)
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |(best_i, best), (i, &s)| {
                if s > best {
                    (i, s)
                } else {
                    (best_i, best)
                }
            });

        let confidence = objectness * class_score;
        if confidence.is_nan() || confidence < conf_threshold {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        candidates.push(Candidate {
            bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
            confidence,
            class_id,
        });
    }

    Ok(candidates)
}

/// Intersection over union of two xyxy boxes
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_x1 = a[0].max(b[0]);
    let inter_y1 = a[1].max(b[1]);
    let inter_x2 = a[2].min(b[2]);
    let inter_y2 = a[3].min(b[3]);

    let inter_area = (inter_x2 - inter_x1).max(0.0) * (inter_y2 - inter_y1).max(0.0);
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union_area = area_a + area_b - inter_area;

    if union_area <= 0.0 {
        0.0
    } else {
        inter_area / union_area
    }
}

/// Class-aware greedy NMS.
///
/// Output is ordered by confidence, highest first. Equal confidences keep
/// their input order, so the result is deterministic for a fixed input.
pub fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    // Stable sort: ties stay in tensor order
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
    candidates.truncate(MAX_NMS_CANDIDATES);

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }

    kept
}

/// Map a model-space box back onto the original image, rounded to pixels.
pub fn scale_to_original(bbox: &[f32; 4], letterbox: &LetterboxParams) -> BoundingBox {
    let (x1, y1) = letterbox.map_to_original(bbox[0], bbox[1]);
    let (x2, y2) = letterbox.map_to_original(bbox[2], bbox[3]);
    BoundingBox {
        x1: x1.round() as u32,
        y1: y1.round() as u32,
        x2: x2.round() as u32,
        y2: y2.round() as u32,
    }
}

/// Round a confidence to 4 decimal places
pub fn round_confidence(confidence: f32) -> f32 {
    ((confidence as f64 * 10_000.0).round() / 10_000.0) as f32
}

/// Full postprocessing: threshold, suppress, rescale, label.
pub fn postprocess(
    output: &ArrayViewD<f32>,
    letterbox: &LetterboxParams,
    class_names: &ClassNames,
    config: &PostprocessConfig,
) -> Result<Vec<Detection>, DetectionError> {
    let candidates = decode_predictions(output, config.conf_threshold)?;
    let kept = non_max_suppression(candidates, config.iou_threshold, config.max_detections);

    Ok(kept
        .into_iter()
        .map(|c| Detection {
            class_id: c.class_id,
            class_name: class_names.label(c.class_id),
            confidence: round_confidence(c.confidence.clamp(0.0, 1.0)),
            bbox: scale_to_original(&c.bbox, letterbox),
        })
        .collect())
}
