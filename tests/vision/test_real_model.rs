// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Tests against real YOLOv5 ONNX weights
//!
//! Ignored by default. Run with:
//! `TEST_MODEL_PATH=/path/to/best.onnx cargo test --test vision_tests -- --ignored`

use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;
use waste_detector::{
    results::ResultStore,
    vision::{
        Annotator, ClassNames, DetectionPipeline, DevicePreference, ModelOptions,
        OnnxDetectionModel,
    },
};

fn model_path() -> String {
    std::env::var("TEST_MODEL_PATH").unwrap_or_else(|_| "./models/best.onnx".to_string())
}

fn load_cpu_model() -> OnnxDetectionModel {
    let options = ModelOptions {
        device: DevicePreference::Cpu,
        intra_threads: 2,
    };
    OnnxDetectionModel::load(model_path(), &options).expect("Failed to load model")
}

fn scene() -> Vec<u8> {
    let img = RgbImage::from_fn(800, 600, |x, y| {
        if (200..500).contains(&x) && (150..450).contains(&y) {
            Rgb([150, 110, 70])
        } else {
            Rgb([230, 230, 230])
        }
    });
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Jpeg).unwrap();
    buf.into_inner()
}

#[test]
#[ignore]
fn test_real_model_warm_up_and_names() {
    let model = load_cpu_model();
    let classes = model.warm_up(640).unwrap();
    assert!(classes > 0);

    let names = ClassNames::resolve(None, model.metadata_names(), classes).unwrap();
    assert!(!names.is_empty());
}

#[test]
#[ignore]
fn test_real_model_pipeline_is_deterministic() {
    let model = load_cpu_model();
    let classes = model.warm_up(640).unwrap();
    let names = ClassNames::resolve(None, model.metadata_names(), classes).unwrap();

    let dir = TempDir::new().unwrap();
    let pipeline = DetectionPipeline::new(
        Arc::new(model),
        names,
        Annotator::new().unwrap(),
        ResultStore::open(dir.path()).unwrap(),
    );

    let bytes = scene();
    let first = pipeline.run(&bytes).unwrap();
    let second = pipeline.run(&bytes).unwrap();

    assert_eq!(first.detections, second.detections);
    for det in &first.detections {
        assert!((0.0..=1.0).contains(&det.confidence));
        assert!(det.bbox.x2 <= 800 && det.bbox.y2 <= 600);
    }

    let saved = image::open(&first.artifact.path).unwrap();
    assert_eq!((saved.width(), saved.height()), (800, 600));
}
