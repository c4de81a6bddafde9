// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! POST /detect tests
//!
//! Driven through the full router with a canned inference backend, so no
//! model weights are needed.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use tower::util::ServiceExt; // for `oneshot`
use waste_detector::vision::MAX_IMAGE_DIMENSION;

use super::common::*;

#[tokio::test]
async fn test_missing_image_field_returns_400() {
    let (app, dir) = test_app(vec![]);

    let body = multipart_body("file", "upload.png", "image/png", &png_bytes(8, 8));
    let response = app.oneshot(detect_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json, serde_json::json!({"error": "No image uploaded"}));
    assert_eq!(stored_files(&dir), 0);
}

#[tokio::test]
async fn test_non_multipart_request_returns_400() {
    let (app, _dir) = test_app(vec![]);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/detect")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"image": "nope"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "No image uploaded");
}

#[tokio::test]
async fn test_blank_image_no_detections() {
    let (app, dir) = test_app(vec![]);

    let response = app.oneshot(upload_request(&png_bytes(64, 48))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["detections"], serde_json::json!([]));

    let url = json["image_url"].as_str().unwrap();
    assert!(url.starts_with("/results/result_"));
    assert!(url.ends_with(".jpg"));
    assert_eq!(stored_files(&dir), 1);
}

#[tokio::test]
async fn test_undecodable_image_returns_400() {
    let (app, dir) = test_app(vec![]);

    let body = multipart_body("image", "upload.png", "image/png", b"not really a png");
    let response = app.oneshot(detect_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().starts_with("Invalid image"));
    assert_eq!(stored_files(&dir), 0);
}

#[tokio::test]
async fn test_image_over_dimension_cap_returns_400() {
    let (app, dir) = test_app(vec![]);

    let png = png_bytes(MAX_IMAGE_DIMENSION + 1, 1);
    let response = app.oneshot(upload_request(&png)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    let expected = format!(
        "Invalid image: Image dimensions exceed {0}x{0}",
        MAX_IMAGE_DIMENSION
    );
    assert_eq!(json["error"], expected.as_str());
    assert_eq!(stored_files(&dir), 0);
}

#[tokio::test]
async fn test_overlapping_boxes_collapse() {
    let rows = vec![
        Row { cx: 100.0, cy: 100.0, w: 80.0, h: 80.0, objectness: 0.9, class_id: 2, class_score: 0.7 },
        Row { cx: 104.0, cy: 102.0, w: 80.0, h: 80.0, objectness: 0.9, class_id: 2, class_score: 0.9 },
    ];
    let (app, _dir) = test_app(rows);

    let response = app.oneshot(upload_request(&png_bytes(640, 640))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let detections = json["detections"].as_array().unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0]["class"], "plastic");
    assert!((detections[0]["confidence"].as_f64().unwrap() - 0.81).abs() < 1e-6);
}

#[tokio::test]
async fn test_confidence_threshold_is_inclusive() {
    let rows = vec![
        Row { cx: 100.0, cy: 100.0, w: 40.0, h: 40.0, objectness: 1.0, class_id: 0, class_score: 0.25 },
        Row { cx: 400.0, cy: 400.0, w: 40.0, h: 40.0, objectness: 1.0, class_id: 1, class_score: 0.2499 },
    ];
    let (app, _dir) = test_app(rows);

    let response = app.oneshot(upload_request(&png_bytes(640, 640))).await.unwrap();
    let json = body_json(response).await;
    let detections = json["detections"].as_array().unwrap();

    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0]["class"], "cardboard");
    assert_eq!(detections[0]["confidence"].as_f64().unwrap(), 0.25);
}

#[tokio::test]
async fn test_detections_ordered_by_confidence() {
    let rows = vec![
        Row { cx: 100.0, cy: 100.0, w: 40.0, h: 40.0, objectness: 0.5, class_id: 0, class_score: 1.0 },
        Row { cx: 300.0, cy: 300.0, w: 40.0, h: 40.0, objectness: 0.9, class_id: 1, class_score: 1.0 },
        Row { cx: 500.0, cy: 500.0, w: 40.0, h: 40.0, objectness: 0.7, class_id: 2, class_score: 1.0 },
    ];
    let (app, _dir) = test_app(rows);

    let response = app.oneshot(upload_request(&png_bytes(640, 640))).await.unwrap();
    let json = body_json(response).await;
    let classes: Vec<&str> = json["detections"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["class"].as_str().unwrap())
        .collect();

    assert_eq!(classes, vec!["glass", "plastic", "cardboard"]);
}

#[tokio::test]
async fn test_oversized_upload_rejected() {
    let (app, dir) = test_app_with_limit(vec![], 1024);

    let response = app.oneshot(upload_request(&vec![0u8; 64 * 1024])).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = body_json(response).await;
    assert_eq!(json, serde_json::json!({"error": "Upload exceeds 1024 bytes"}));
    assert_eq!(stored_files(&dir), 0);
}
