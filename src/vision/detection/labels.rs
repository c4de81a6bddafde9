// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Class id -> label mapping for the detector

use std::fs;
use std::path::Path;
use tracing::warn;

use super::DetectionError;

/// Fixed lookup from class index to human readable label.
///
/// Built once at start-up, never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassNames {
    names: Vec<String>,
}

impl ClassNames {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Labels named after their index ("0", "1", ...)
    pub fn numeric(count: usize) -> Self {
        Self::new((0..count).map(|i| i.to_string()).collect())
    }

    /// Load a labels file: one label per line, blank lines skipped
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DetectionError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            DetectionError::Labels(format!("cannot read {}: {}", path.display(), e))
        })?;

        let names: Vec<String> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        if names.is_empty() {
            return Err(DetectionError::Labels(format!(
                "labels file {} is empty",
                path.display()
            )));
        }

        Ok(Self::new(names))
    }

    /// Parse the `names` metadata written by the YOLOv5 ONNX exporter.
    ///
    /// Accepts a dict literal `{0: 'cardboard', 1: 'glass'}` or a list
    /// literal `['cardboard', 'glass']`.
    pub fn from_metadata(value: &str) -> Result<Self, DetectionError> {
        let value = value.trim();
        let names = if value.starts_with('{') && value.ends_with('}') {
            parse_dict(&value[1..value.len() - 1])?
        } else if value.starts_with('[') && value.ends_with(']') {
            split_literal(&value[1..value.len() - 1])
                .into_iter()
                .map(unquote)
                .collect::<Result<Vec<_>, _>>()?
        } else {
            return Err(DetectionError::Labels(format!(
                "unrecognised names metadata: {}",
                value
            )));
        };

        if names.is_empty() {
            return Err(DetectionError::Labels("names metadata is empty".to_string()));
        }
        Ok(Self::new(names))
    }

    /// Pick the class mapping for a model with `num_classes` outputs.
    ///
    /// Order: labels file, then model metadata, then numeric labels.
    pub fn resolve(
        labels_path: Option<&Path>,
        metadata: Option<&ClassNames>,
        num_classes: usize,
    ) -> Result<Self, DetectionError> {
        let (names, source) = match (labels_path, metadata) {
            (Some(path), _) => (Self::from_file(path)?, "labels file"),
            (None, Some(names)) => (names.clone(), "model metadata"),
            (None, None) => {
                warn!(
                    "No class names in model metadata and no labels file; using numeric labels"
                );
                return Ok(Self::numeric(num_classes));
            }
        };

        if names.len() != num_classes {
            warn!(
                "{} has {} labels but the model predicts {} classes",
                source,
                names.len(),
                num_classes
            );
        }
        Ok(names)
    }

    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.names.get(class_id).map(String::as_str)
    }

    /// Label for a class id, falling back to the id itself
    pub fn label(&self, class_id: usize) -> String {
        self.get(class_id)
            .map(str::to_string)
            .unwrap_or_else(|| class_id.to_string())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn parse_dict(body: &str) -> Result<Vec<String>, DetectionError> {
    let mut entries = Vec::new();
    for item in split_literal(body) {
        let (key, value) = item.split_once(':').ok_or_else(|| {
            DetectionError::Labels(format!("malformed names entry: {}", item))
        })?;
        let id: usize = key
            .trim()
            .parse()
            .map_err(|_| DetectionError::Labels(format!("non-numeric class id: {}", key)))?;
        entries.push((id, unquote(value)?));
    }

    entries.sort_by_key(|(id, _)| *id);
    for (expected, (id, _)) in entries.iter().enumerate() {
        if *id != expected {
            return Err(DetectionError::Labels(format!(
                "class ids are not contiguous: expected {}, found {}",
                expected, id
            )));
        }
    }

    Ok(entries.into_iter().map(|(_, name)| name).collect())
}

/// Split on commas that are not inside quotes
fn split_literal(body: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, ch) in body.char_indices() {
        match (quote, ch) {
            (None, '\'' | '"') => quote = Some(ch),
            (Some(q), c) if c == q => quote = None,
            (None, ',') => {
                items.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(&body[start..]);

    items
        .into_iter()
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

fn unquote(item: &str) -> Result<String, DetectionError> {
    let item = item.trim();
    let quoted = item.len() >= 2
        && ((item.starts_with('\'') && item.ends_with('\''))
            || (item.starts_with('"') && item.ends_with('"')));
    if !quoted {
        return Err(DetectionError::Labels(format!("expected quoted label: {}", item)));
    }
    Ok(item[1..item.len() - 1].to_string())
}
