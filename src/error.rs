//! Error types shared across the crate.
//!
//! None of these ever crash the tracking loop: store and source failures are
//! logged at the call site and the loop carries on. They exist so collaborators
//! can say *why* something went missing.

use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by an [`InteractionStore`](crate::store::InteractionStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no stored interaction with id {0}")]
    UnknownInteraction(u64),
    #[error("summary grid is {actual_rows}x{actual_cols}, expected {rows}x{cols}")]
    GridMismatch {
        rows: usize,
        cols: usize,
        actual_rows: usize,
        actual_cols: usize,
    },
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("unable to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to encode records: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure reported by a [`DetectionSource`](crate::pipeline::DetectionSource).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unable to open detection source {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to read frame: {0}")]
    Read(#[from] std::io::Error),
    #[error("malformed frame on line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("calibration failed: {0}")]
    Calibration(String),
}

/// Configuration that could not be loaded or does not make sense.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to write configuration {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Umbrella error for callers that drive the whole engine.
#[derive(Debug, Error)]
pub enum ScoutError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("heatmap rendering failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("unable to start monitor thread: {0}")]
    MonitorSpawn(#[source] std::io::Error),
    #[error("monitor thread panicked")]
    MonitorPanicked,
}
