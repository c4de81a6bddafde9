// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// JPEG quality of annotated results
pub const JPEG_QUALITY: u8 = 95;

/// URL prefix the results directory is served under
pub const RESULTS_URL_PREFIX: &str = "/results";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Results directory {path} is unusable: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write result {filename}: {source}")]
    Write {
        filename: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode result {filename}: {message}")]
    Encode { filename: String, message: String },
}

/// An annotated image written to the results directory
#[derive(Debug, Clone)]
pub struct ResultArtifact {
    pub filename: String,
    pub path: PathBuf,
    /// Public URL, `/results/<filename>`
    pub url: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Flat directory of `result_<unix-ts>_<suffix>.jpg` files
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    /// Open the results directory, creating it if absent
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Directory {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// JPEG-encode `image` under a fresh name.
    ///
    /// Written to a hidden temporary file first and renamed into place, so
    /// a half-written file is never visible under its public name.
    pub fn persist(&self, image: &RgbImage) -> Result<ResultArtifact, StoreError> {
        let created_at = Utc::now();
        let filename = result_filename(created_at);
        let path = self.dir.join(&filename);
        let tmp_path = self.dir.join(format!(".{}.tmp", filename));

        let written = write_jpeg(&tmp_path, image, &filename).and_then(|()| {
            fs::rename(&tmp_path, &path).map_err(|source| StoreError::Write {
                filename: filename.clone(),
                source,
            })
        });

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        let size_bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        debug!("Stored {} ({} bytes)", filename, size_bytes);

        Ok(ResultArtifact {
            url: format!("{}/{}", RESULTS_URL_PREFIX, filename),
            filename,
            path,
            size_bytes,
            created_at,
        })
    }
}

fn write_jpeg(path: &Path, image: &RgbImage, filename: &str) -> Result<(), StoreError> {
    let write_err = |source| StoreError::Write {
        filename: filename.to_string(),
        source,
    };

    let mut writer = BufWriter::new(File::create(path).map_err(write_err)?);
    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
        .encode_image(image)
        .map_err(|e| StoreError::Encode {
            filename: filename.to_string(),
            message: e.to_string(),
        })?;
    writer.flush().map_err(write_err)
}

/// `result_<unix-ts>_<8 hex>.jpg`
pub fn result_filename(at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("result_{}_{}.jpg", at.timestamp(), &suffix[..8])
}
