//! The mix plan: what plays where, decided before any samples are mixed.

use std::fmt;
use std::sync::Arc;

use crate::assets::AudioAsset;
use crate::error::{AssetError, NarrationError};
use crate::types::{Emotion, NarrationSource};

/// How the background track for a segment was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundFallback {
    /// The segment's own emotion.
    Requested,
    /// The configured default emotion.
    DefaultEmotion,
    /// First usable file in the background directory.
    DirectoryScan,
}

#[derive(Debug, Clone)]
pub enum BackgroundLayer {
    Track {
        asset: Arc<AudioAsset>,
        requested: Emotion,
        /// Emotion whose mapping supplied the track; `None` for a directory scan.
        used: Option<Emotion>,
        fallback: BackgroundFallback,
        /// Asset is shorter than the segment and restarts from zero.
        looped: bool,
    },
    None {
        reason: String,
    },
}

impl BackgroundLayer {
    pub fn asset(&self) -> Option<&Arc<AudioAsset>> {
        match self {
            BackgroundLayer::Track { asset, .. } => Some(asset),
            BackgroundLayer::None { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SfxCue {
    pub tag: String,
    /// Seconds from the segment start.
    pub offset_s: f64,
    pub asset: Arc<AudioAsset>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Unresolved(AssetError),
    /// The segment has no time to place the cue in.
    EmptySlot,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unresolved(e) => write!(f, "{}", e),
            SkipReason::EmptySlot => f.write_str("segment has zero duration"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedCue {
    pub tag: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct PlannedSegment {
    pub index: usize,
    pub narration: NarrationSource,
    /// Effective duration in seconds.
    pub duration_s: f64,
    /// Silence before the segment.
    pub lead_in_s: f64,
    pub background: BackgroundLayer,
    pub cues: Vec<SfxCue>,
    pub skipped_cues: Vec<SkippedCue>,
    pub pause_after_s: f64,
}

impl PlannedSegment {
    pub fn span_s(&self) -> f64 {
        self.lead_in_s + self.duration_s + self.pause_after_s
    }
}

/// Something that did not go as requested but did not stop the mix.
#[derive(Debug, Clone, PartialEq)]
pub enum Degradation {
    MissingNarration {
        segment: usize,
        reason: NarrationError,
    },
    BackgroundFallback {
        segment: usize,
        requested: Emotion,
        fallback: BackgroundFallback,
    },
    NoBackground {
        segment: usize,
        reason: String,
    },
    SkippedCue {
        segment: usize,
        tag: String,
        reason: SkipReason,
    },
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::MissingNarration { segment, reason } => {
                write!(f, "segment {}: narration replaced by silence ({})", segment, reason)
            }
            Degradation::BackgroundFallback {
                segment,
                requested,
                fallback,
            } => {
                let used = match fallback {
                    BackgroundFallback::Requested => "requested track",
                    BackgroundFallback::DefaultEmotion => "default emotion's track",
                    BackgroundFallback::DirectoryScan => "first track in the background directory",
                };
                write!(f, "segment {}: no background for '{}', using {}", segment, requested, used)
            }
            Degradation::NoBackground { segment, reason } => {
                write!(f, "segment {}: no background ({})", segment, reason)
            }
            Degradation::SkippedCue {
                segment,
                tag,
                reason,
            } => write!(f, "segment {}: skipped sfx '{}' ({})", segment, tag, reason),
        }
    }
}

/// Ordered, immutable mixing instructions.
#[derive(Debug, Clone, Default)]
pub struct MixPlan {
    pub segments: Vec<PlannedSegment>,
}

impl MixPlan {
    pub fn total_duration_s(&self) -> f64 {
        self.segments.iter().map(PlannedSegment::span_s).sum()
    }

    pub fn degradations(&self) -> Vec<Degradation> {
        let mut out = Vec::new();
        for seg in &self.segments {
            if let NarrationSource::Missing { reason } = &seg.narration {
                out.push(Degradation::MissingNarration {
                    segment: seg.index,
                    reason: reason.clone(),
                });
            }
            match &seg.background {
                BackgroundLayer::Track {
                    requested, fallback, ..
                } if *fallback != BackgroundFallback::Requested => {
                    out.push(Degradation::BackgroundFallback {
                        segment: seg.index,
                        requested: *requested,
                        fallback: *fallback,
                    });
                }
                BackgroundLayer::None { reason } => out.push(Degradation::NoBackground {
                    segment: seg.index,
                    reason: reason.clone(),
                }),
                _ => {}
            }
            for skipped in &seg.skipped_cues {
                out.push(Degradation::SkippedCue {
                    segment: seg.index,
                    tag: skipped.tag.clone(),
                    reason: skipped.reason.clone(),
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetKind;
    use std::path::PathBuf;

    fn planned(index: usize, duration_s: f64, pause_after_s: f64) -> PlannedSegment {
        PlannedSegment {
            index,
            narration: NarrationSource::Clip {
                path: PathBuf::from("n.wav"),
                duration_s,
            },
            duration_s,
            lead_in_s: 0.0,
            background: BackgroundLayer::None {
                reason: "test".into(),
            },
            cues: vec![],
            skipped_cues: vec![],
            pause_after_s,
        }
    }

    #[test]
    fn test_total_duration_sums_spans() {
        let mut first = planned(0, 3.0, 0.5);
        first.lead_in_s = 2.0;
        let plan = MixPlan {
            segments: vec![first, planned(1, 2.0, 0.0)],
        };
        assert!((plan.total_duration_s() - 7.5).abs() < 1e-12);
    }

    #[test]
    fn test_degradations_listed_in_order() {
        let mut seg = planned(0, 1.0, 0.0);
        seg.narration = NarrationSource::Missing {
            reason: NarrationError::Absent,
        };
        seg.skipped_cues.push(SkippedCue {
            tag: "explosion".into(),
            reason: SkipReason::Unresolved(AssetError::NotFound {
                kind: AssetKind::Sfx,
                key: "explosion".into(),
            }),
        });
        let plan = MixPlan { segments: vec![seg] };

        let found = plan.degradations();
        assert_eq!(found.len(), 3);
        assert!(matches!(found[0], Degradation::MissingNarration { .. }));
        assert!(matches!(found[1], Degradation::NoBackground { .. }));
        assert!(found[2].to_string().contains("explosion"));
    }
}
