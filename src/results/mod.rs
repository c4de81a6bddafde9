// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Annotated result images on local disk
pub mod store;

pub use store::{result_filename, ResultArtifact, ResultStore, StoreError, JPEG_QUALITY};
