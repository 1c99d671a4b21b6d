//! Error types for asset resolution, narration probing, export and mixing.
//!
//! Only [`MixError`] ever reaches the caller of the pipeline. Everything else
//! is absorbed by the timeline builder or the mixer and recorded as a
//! degradation.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::assets::AssetKind;

/// Failure to turn a logical key into a decoded audio asset.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AssetError {
    #[error("no {kind} asset mapped for '{key}'")]
    NotFound { kind: AssetKind, key: String },

    #[error("{kind} asset '{key}' at {} is unreadable: {reason}", path.display())]
    Unreadable {
        kind: AssetKind,
        key: String,
        path: PathBuf,
        reason: String,
    },
}

/// Why a segment has no usable narration clip.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NarrationError {
    #[error("no narration file was provided")]
    Absent,

    #[error("narration file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("narration file {} is only {size} bytes", path.display())]
    TooSmall { path: PathBuf, size: u64 },

    #[error("narration file {} is unreadable: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("narration file {} contains no audio", .0.display())]
    Empty(PathBuf),

    #[error("narration did not become ready within {0:?}")]
    TimedOut(Duration),

    #[error("speech synthesis failed: {0}")]
    SynthesisFailed(String),
}

/// Terminal-validation failures of a single export attempt.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export did not finish within {0:?}")]
    Timeout(Duration),

    #[error("encoded output is {actual} bytes, not above the minimum of {min}")]
    TooSmall { actual: u64, min: u64 },

    #[error("encoded output is {actual_s:.3}s long, not above the minimum of {min_s:.3}s")]
    TooShort { actual_s: f64, min_s: f64 },

    #[error("encoder failed: {0}")]
    Encode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<hound::Error> for ExportError {
    fn from(e: hound::Error) -> Self {
        ExportError::Encode(e.to_string())
    }
}

/// Problems with the mixer configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Fatal errors surfaced by the pipeline entry points.
#[derive(Debug, Error)]
pub enum MixError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Export validation failed on the original attempt and on the retry.
    #[error("mix failed after retry: {0}")]
    Failure(#[source] ExportError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = MixError> = std::result::Result<T, E>;
