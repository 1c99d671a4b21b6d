use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::NarrationError;

/// Emotion label attached to a narrated segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    #[default]
    Neutral,
}

impl Emotion {
    pub const ALL: [Emotion; 6] = [
        Emotion::Joy,
        Emotion::Sadness,
        Emotion::Anger,
        Emotion::Fear,
        Emotion::Surprise,
        Emotion::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Joy => "joy",
            Emotion::Sadness => "sadness",
            Emotion::Anger => "anger",
            Emotion::Fear => "fear",
            Emotion::Surprise => "surprise",
            Emotion::Neutral => "neutral",
        }
    }

    /// Parse a label from an upstream classifier.
    ///
    /// Unknown or empty labels map to `default` instead of failing.
    pub fn parse_lossy(label: Option<&str>, default: Emotion) -> Emotion {
        match label.map(str::trim).filter(|l| !l.is_empty()) {
            None => default,
            Some(l) => l.parse().unwrap_or_else(|_| {
                log::warn!("Unknown emotion label '{}', using '{}'", l, default);
                default
            }),
        }
    }
}


impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown emotion '{0}'")]
pub struct UnknownEmotion(pub String);

impl FromStr for Emotion {
    type Err = UnknownEmotion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Emotion::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == lower)
            .ok_or_else(|| UnknownEmotion(s.to_string()))
    }
}

/// One segment as handed over by the text/emotion/synthesis collaborators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentInput {
    pub text: String,
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(default, alias = "sfx")]
    pub sfx_tags: Vec<String>,
    #[serde(default)]
    pub audio_file: Option<PathBuf>,
}

/// A group of segments with an optional spoken title.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChapterInput {
    #[serde(default)]
    pub title: Option<String>,
    pub segments: Vec<SegmentInput>,
}

/// Where a segment's narration comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum NarrationSource {
    Clip { path: PathBuf, duration_s: f64 },
    Missing { reason: NarrationError },
}

impl NarrationSource {
    pub fn duration_s(&self) -> f64 {
        match self {
            NarrationSource::Clip { duration_s, .. } => *duration_s,
            NarrationSource::Missing { .. } => 0.0,
        }
    }
}

/// One narrated unit, read-only once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub text: String,
    pub emotion: Emotion,
    pub sfx_tags: Vec<String>,
    pub narration: NarrationSource,
}

impl Segment {
    pub fn new(text: impl Into<String>, emotion: Emotion, narration: NarrationSource) -> Self {
        Self {
            text: text.into(),
            emotion,
            sfx_tags: Vec::new(),
            narration,
        }
    }

    pub fn with_sfx<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.sfx_tags = tags.into_iter().filter_map(|t| normalize_sfx_id(t.as_ref())).collect();
        self
    }

    /// Narration duration in seconds, 0 when narration is missing.
    pub fn duration_s(&self) -> f64 {
        self.narration.duration_s()
    }
}

/// Resolved segments grouped under an optional title.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub title: Option<String>,
    pub segments: Vec<Segment>,
}

/// Normalize an SFX identifier: trimmed, lowercase, never empty.
pub fn normalize_sfx_id(id: &str) -> Option<String> {
    let id = id.trim().to_ascii_lowercase();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}
