// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection endpoint handler

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use bytes::Bytes;
use tracing::{debug, info, warn};

use super::response::DetectResponse;
use crate::api::errors::ApiError;
use crate::api::http_server::AppState;

/// Multipart field carrying the upload
pub const IMAGE_FIELD: &str = "image";

/// POST /detect - Detect objects in an uploaded image
///
/// Accepts a multipart form with an `image` file field, runs the detector,
/// stores an annotated copy and returns the detections.
///
/// # Response
/// - `detections`: `[{"class", "confidence"}]`, highest confidence first
/// - `image_url`: `/results/<file>` of the annotated JPEG
///
/// # Errors
/// - 400 Bad Request: no `image` field, or it is not a decodable image
/// - 413 Payload Too Large: upload exceeds the body limit
/// - 500 Internal Server Error: inference or storage failed
pub async fn detect_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectResponse>, ApiError> {
    // Not multipart at all: same answer as a form without the field
    let mut multipart = multipart.map_err(|e| {
        debug!("Rejected non-multipart upload: {}", e);
        ApiError::MissingImage
    })?;

    let image = read_image_field(&mut multipart, state.max_upload_bytes)
        .await?
        .ok_or(ApiError::MissingImage)?;

    debug!("Received {} byte upload", image.len());

    let pipeline = state.pipeline.clone();
    let outcome = tokio::task::spawn_blocking(move || pipeline.run(&image))
        .await
        .map_err(|e| ApiError::InternalError(format!("Detection task failed: {}", e)))??;

    info!(
        "Detected {} objects in {}x{} image, {}ms -> {}",
        outcome.detections.len(),
        outcome.image_info.width,
        outcome.image_info.height,
        outcome.processing_time_ms,
        outcome.artifact.filename
    );

    Ok(Json(DetectResponse::new(
        &outcome.detections,
        outcome.artifact.url,
    )))
}

/// Bytes of the first `image` field, skipping any other fields
async fn read_image_field(
    multipart: &mut Multipart,
    max_upload_bytes: usize,
) -> Result<Option<Bytes>, ApiError> {
    let to_api_error = |e| multipart_error(e, max_upload_bytes);
    while let Some(field) = multipart.next_field().await.map_err(to_api_error)? {
        if field.name() == Some(IMAGE_FIELD) {
            let bytes = field.bytes().await.map_err(to_api_error)?;
            return Ok(Some(bytes));
        }
    }
    Ok(None)
}

fn multipart_error(err: MultipartError, max_upload_bytes: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        debug!("Upload over {} bytes refused: {}", max_upload_bytes, err);
        ApiError::PayloadTooLarge(upload_limit_message(max_upload_bytes))
    } else {
        warn!("Malformed multipart upload: {}", err);
        ApiError::InvalidRequest(err.body_text())
    }
}

fn upload_limit_message(max_upload_bytes: usize) -> String {
    format!("Upload exceeds {} bytes", max_upload_bytes)
}
