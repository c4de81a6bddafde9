// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Shared fixtures for the HTTP tests: a canned inference backend and
//! multipart request builders

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use image::{ImageFormat, Rgb, RgbImage};
use ndarray::{Array3, Array4, ArrayD};
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;
use waste_detector::{
    api::{create_app, AppState, DEFAULT_MAX_UPLOAD_BYTES},
    results::ResultStore,
    vision::{Annotator, ClassNames, DetectionError, DetectionPipeline, InferenceBackend},
};

pub const BOUNDARY: &str = "----waste-detector-test-boundary";

pub const CLASSES: [&str; 3] = ["cardboard", "glass", "plastic"];

/// One prediction row: centre, size, objectness and a single class score
#[derive(Debug, Clone, Copy)]
pub struct Row {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub objectness: f32,
    pub class_id: usize,
    pub class_score: f32,
}

/// Ignores its input and returns the same `[1, N, 5 + 3]` tensor every time
pub struct CannedBackend {
    pub rows: Vec<Row>,
}

impl InferenceBackend for CannedBackend {
    fn forward(&self, _input: &Array4<f32>) -> Result<ArrayD<f32>, DetectionError> {
        let mut out = Array3::<f32>::zeros((1, self.rows.len(), 5 + CLASSES.len()));
        for (i, row) in self.rows.iter().enumerate() {
            out[[0, i, 0]] = row.cx;
            out[[0, i, 1]] = row.cy;
            out[[0, i, 2]] = row.w;
            out[[0, i, 3]] = row.h;
            out[[0, i, 4]] = row.objectness;
            out[[0, i, 5 + row.class_id]] = row.class_score;
        }
        Ok(out.into_dyn())
    }
}

/// Router over a fresh results directory; keep the `TempDir` alive
pub fn test_app(rows: Vec<Row>) -> (Router, TempDir) {
    test_app_with_limit(rows, DEFAULT_MAX_UPLOAD_BYTES)
}

pub fn test_app_with_limit(rows: Vec<Row>, max_upload_bytes: usize) -> (Router, TempDir) {
    let dir = TempDir::new().unwrap();
    let pipeline = DetectionPipeline::new(
        Arc::new(CannedBackend { rows }),
        ClassNames::new(CLASSES.iter().map(|c| c.to_string()).collect()),
        Annotator::new().unwrap(),
        ResultStore::open(dir.path()).unwrap(),
    );
    (create_app(AppState::new(pipeline, max_upload_bytes)), dir)
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Multipart body with one file field
pub fn multipart_body(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn detect_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/detect")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn upload_request(data: &[u8]) -> Request<Body> {
    detect_request(multipart_body("image", "upload.png", "image/png", data))
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn stored_files(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path()).unwrap().count()
}
