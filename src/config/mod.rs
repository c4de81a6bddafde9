// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Command line and environment configuration
pub mod server;

pub use server::{check_input_geometry, ServerArgs};
