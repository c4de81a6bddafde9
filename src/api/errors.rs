// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, warn};

use crate::vision::PipelineError;

/// Body of every error response: `{"error": "..."}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone)]
pub enum ApiError {
    /// No `image` field in the upload
    MissingImage,
    /// Upload present but not a decodable image
    InvalidImage(String),
    /// Malformed multipart body
    InvalidRequest(String),
    PayloadTooLarge(String),
    InternalError(String),
}

impl ApiError {
    /// Message placed in the `error` field
    pub fn message(&self) -> String {
        match self {
            ApiError::MissingImage => "No image uploaded".to_string(),
            ApiError::InvalidImage(msg) => format!("Invalid image: {}", msg),
            ApiError::InvalidRequest(msg) => msg.clone(),
            ApiError::PayloadTooLarge(msg) => msg.clone(),
            ApiError::InternalError(msg) => msg.clone(),
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.message(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::MissingImage | ApiError::InvalidImage(_) | ApiError::InvalidRequest(_) => 400,
            ApiError::PayloadTooLarge(_) => 413,
            ApiError::InternalError(_) => 500,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::MissingImage => write!(f, "No image uploaded"),
            ApiError::InvalidImage(msg) => write!(f, "Invalid image: {}", msg),
            ApiError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ApiError::PayloadTooLarge(msg) => write!(f, "Payload too large: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Image(e) => ApiError::InvalidImage(e.to_string()),
            PipelineError::Detection(e) => ApiError::InternalError(e.to_string()),
            PipelineError::Store(e) => ApiError::InternalError(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("{}", self);
        } else {
            warn!("{}", self);
        }

        (status, Json(self.to_response())).into_response()
    }
}
