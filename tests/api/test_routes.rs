// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Route tests: liveness, result serving and CORS

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use tower::util::ServiceExt;
use waste_detector::api::HEALTH_MESSAGE;

use super::common::*;

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_health_route() {
    let (app, _dir) = test_app(vec![]);

    let response = app.oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));
    assert_eq!(body_bytes(response).await, HEALTH_MESSAGE.as_bytes());
}

#[tokio::test]
async fn test_result_round_trip() {
    let (app, _dir) = test_app(vec![Row {
        cx: 200.0,
        cy: 150.0,
        w: 100.0,
        h: 60.0,
        objectness: 0.95,
        class_id: 1,
        class_score: 0.9,
    }]);

    let response = app
        .clone()
        .oneshot(upload_request(&png_bytes(320, 240)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let url = json["image_url"].as_str().unwrap().to_string();

    let response = app.oneshot(get(&url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = body_bytes(response).await;
    let image = image::load_from_memory(&bytes).unwrap();
    assert_eq!((image.width(), image.height()), (320, 240));
}

#[tokio::test]
async fn test_unknown_result_is_404() {
    let (app, _dir) = test_app(vec![]);

    let response = app.oneshot(get("/results/result_0_deadbeef.jpg")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_results_path_traversal_refused() {
    let (app, _dir) = test_app(vec![]);

    let response = app.oneshot(get("/results/../Cargo.toml")).await.unwrap();

    assert_ne!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_cors_headers_present() {
    let (app, _dir) = test_app(vec![]);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/")
        .header(header::ORIGIN, "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}

#[tokio::test]
async fn test_detect_rejects_get() {
    let (app, _dir) = test_app(vec![]);

    let response = app.oneshot(get("/detect")).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
