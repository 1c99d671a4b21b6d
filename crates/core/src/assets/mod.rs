//! Asset resolution: logical keys (emotion, SFX id) to decoded audio.

pub mod resolver;
pub mod source;

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

pub use resolver::AssetResolver;
pub use source::{AssetAvailability, AssetSource, FileAssetSource, SilentAssetSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Background,
    Sfx,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Background => f.pad("background"),
            AssetKind::Sfx => f.pad("sfx"),
        }
    }
}

/// Decoded, read-only audio for one logical key.
///
/// Samples are mono at the output sample rate.
#[derive(Clone, PartialEq)]
pub struct AudioAsset {
    pub kind: AssetKind,
    pub key: String,
    /// File the samples came from; `None` for generated silence.
    pub path: Option<PathBuf>,
    pub samples: Vec<f64>,
    pub sample_rate: u32,
}

impl AudioAsset {
    pub fn frames(&self) -> usize {
        self.samples.len()
    }

    pub fn duration_s(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

impl fmt::Debug for AudioAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioAsset")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("path", &self.path)
            .field("frames", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}
