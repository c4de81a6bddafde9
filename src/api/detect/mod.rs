// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection API endpoint module
//!
//! Provides POST /detect for multipart image uploads.

pub mod handler;
pub mod response;

pub use handler::{detect_handler, IMAGE_FIELD};
pub use response::{DetectResponse, DetectedObject};
