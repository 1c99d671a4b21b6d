//! Turns resolved segments into a [`MixPlan`].
//!
//! Every asset problem is absorbed here: a missing background falls back,
//! a missing effect is skipped and recorded. Building never fails.

use std::collections::HashMap;
use std::sync::Arc;

use crate::assets::{AssetKind, AssetResolver, AudioAsset};
use crate::audio::effects::seconds_to_frames;
use crate::config::{MixConfig, SfxOffsetPolicy};
use crate::types::{Chapter, Emotion, Segment};

use super::plan::{BackgroundFallback, BackgroundLayer, MixPlan, PlannedSegment, SfxCue, SkipReason, SkippedCue};

pub struct TimelineBuilder<'a> {
    config: &'a MixConfig,
    resolver: &'a AssetResolver,
}

impl<'a> TimelineBuilder<'a> {
    pub fn new(config: &'a MixConfig, resolver: &'a AssetResolver) -> Self {
        Self { config, resolver }
    }

    /// Plan segments in order, with `pause_s` between consecutive segments.
    pub fn build(&self, segments: &[Segment]) -> MixPlan {
        let last = segments.len().saturating_sub(1);
        let planned = segments
            .iter()
            .enumerate()
            .map(|(i, seg)| {
                let pause = if i < last { self.config.pause_s } else { 0.0 };
                self.plan_segment(i, seg, 0.0, pause)
            })
            .collect();
        MixPlan { segments: planned }
    }

    /// Plan several chapters as one track.
    ///
    /// A titled chapter starts with `chapter_title_pause_s` of silence;
    /// consecutive chapters are separated by `chapter_gap_s` instead of the
    /// normal pause. Empty chapters are skipped.
    pub fn build_chapters(&self, chapters: &[Chapter]) -> MixPlan {
        let chapters: Vec<&Chapter> = chapters.iter().filter(|c| !c.segments.is_empty()).collect();
        let mut planned = Vec::new();
        let mut index = 0;

        for (ci, chapter) in chapters.iter().enumerate() {
            let last_chapter = ci + 1 == chapters.len();
            let last_seg = chapter.segments.len() - 1;
            log::debug!(
                "Chapter {}: {} ({} segments)",
                ci + 1,
                chapter.title.as_deref().unwrap_or("untitled"),
                chapter.segments.len()
            );

            for (si, seg) in chapter.segments.iter().enumerate() {
                let lead_in = match (&chapter.title, si) {
                    (Some(_), 0) => self.config.chapter_title_pause_s,
                    _ => 0.0,
                };
                let pause = if si < last_seg {
                    self.config.pause_s
                } else if !last_chapter {
                    self.config.chapter_gap_s
                } else {
                    0.0
                };
                planned.push(self.plan_segment(index, seg, lead_in, pause));
                index += 1;
            }
        }
        MixPlan { segments: planned }
    }

    fn plan_segment(&self, index: usize, seg: &Segment, lead_in_s: f64, pause_after_s: f64) -> PlannedSegment {
        let duration_s = self.effective_duration(seg);

        let (background, cues, skipped_cues) = if duration_s > 0.0 {
            let background = self.plan_background(seg.emotion, duration_s);
            let (cues, skipped) = self.plan_cues(seg, duration_s);
            (background, cues, skipped)
        } else {
            let skipped: Vec<SkippedCue> = seg
                .sfx_tags
                .iter()
                .map(|tag| SkippedCue {
                    tag: tag.clone(),
                    reason: SkipReason::EmptySlot,
                })
                .collect();
            let none = BackgroundLayer::None {
                reason: "segment has zero duration".into(),
            };
            (none, Vec::new(), skipped)
        };

        log::debug!(
            "Segment {}: {:.3}s, emotion {}, {} cue(s), {} skipped",
            index,
            duration_s,
            seg.emotion,
            cues.len(),
            skipped_cues.len()
        );

        PlannedSegment {
            index,
            narration: seg.narration.clone(),
            duration_s,
            lead_in_s,
            background,
            cues,
            skipped_cues,
            pause_after_s,
        }
    }

    fn effective_duration(&self, seg: &Segment) -> f64 {
        let narration = seg.duration_s();
        let min = self.config.min_segment_duration_s;
        if narration <= 0.0 {
            return min;
        }
        if seg.text.trim().is_empty() && !seg.sfx_tags.is_empty() {
            return narration.max(min);
        }
        narration
    }

    fn plan_background(&self, emotion: Emotion, duration_s: f64) -> BackgroundLayer {
        let default = self.config.default_emotion;

        let first_err = match self.resolver.resolve(AssetKind::Background, emotion.as_str()) {
            Ok(asset) => return track(asset, emotion, Some(emotion), BackgroundFallback::Requested, duration_s),
            Err(e) => e,
        };

        if default != emotion {
            if let Ok(asset) = self.resolver.resolve(AssetKind::Background, default.as_str()) {
                return track(asset, emotion, Some(default), BackgroundFallback::DefaultEmotion, duration_s);
            }
        }

        match self.resolver.resolve_any_background() {
            Ok(asset) => track(asset, emotion, None, BackgroundFallback::DirectoryScan, duration_s),
            Err(_) => BackgroundLayer::None {
                reason: first_err.to_string(),
            },
        }
    }

    fn plan_cues(&self, seg: &Segment, duration_s: f64) -> (Vec<SfxCue>, Vec<SkippedCue>) {
        let mut cues = Vec::new();
        let mut skipped = Vec::new();
        let mut seen: HashMap<&str, usize> = HashMap::new();

        for tag in &seg.sfx_tags {
            let occurrence = seen.entry(tag.as_str()).or_insert(0);
            let nth = *occurrence;
            *occurrence += 1;

            match self.resolver.resolve(AssetKind::Sfx, tag) {
                Ok(asset) => {
                    let wanted = self.cue_fraction(&seg.text, tag, nth) * duration_s;
                    let offset_s = clamp_offset(wanted, duration_s, asset.duration_s());
                    cues.push(SfxCue {
                        tag: tag.clone(),
                        offset_s,
                        asset,
                    });
                }
                Err(e) => skipped.push(SkippedCue {
                    tag: tag.clone(),
                    reason: SkipReason::Unresolved(e),
                }),
            }
        }
        (cues, skipped)
    }

    fn cue_fraction(&self, text: &str, tag: &str, nth: usize) -> f64 {
        match self.config.sfx_offset {
            SfxOffsetPolicy::Fixed { fraction } => fraction,
            SfxOffsetPolicy::KeywordPosition { fallback_fraction } => {
                keyword_fraction(text, tag, nth).unwrap_or(fallback_fraction)
            }
        }
    }
}

fn track(
    asset: Arc<AudioAsset>,
    requested: Emotion,
    used: Option<Emotion>,
    fallback: BackgroundFallback,
    duration_s: f64,
) -> BackgroundLayer {
    let looped = asset.frames() < seconds_to_frames(duration_s, asset.sample_rate);
    BackgroundLayer::Track {
        asset,
        requested,
        used,
        fallback,
        looped,
    }
}

/// Character position of the `nth` case-insensitive whole-word occurrence
/// of `tag` in `text`, as a fraction of the text length.
fn keyword_fraction(text: &str, tag: &str, nth: usize) -> Option<f64> {
    let lower = text.to_lowercase();
    let total = lower.chars().count();
    if total == 0 || tag.is_empty() {
        return None;
    }
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let (byte_pos, _) = lower
        .match_indices(tag)
        .filter(|(pos, m)| {
            let before = lower[..*pos].chars().next_back();
            let after = lower[pos + m.len()..].chars().next();
            !before.is_some_and(is_word) && !after.is_some_and(is_word)
        })
        .nth(nth)?;
    Some(lower[..byte_pos].chars().count() as f64 / total as f64)
}

/// Keep the cue inside the segment: it may start no later than
/// `duration - cue_len`, and never before zero.
fn clamp_offset(offset_s: f64, duration_s: f64, cue_len_s: f64) -> f64 {
    let latest = (duration_s - cue_len_s).max(0.0);
    offset_s.clamp(0.0, latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NarrationError;
    use crate::testutil::populated_assets;
    use crate::types::NarrationSource;
    use std::path::PathBuf;

    fn clip(text: &str, emotion: Emotion, secs: f64) -> Segment {
        Segment::new(
            text,
            emotion,
            NarrationSource::Clip {
                path: PathBuf::from("unused.wav"),
                duration_s: secs,
            },
        )
    }

    fn missing(text: &str, emotion: Emotion) -> Segment {
        Segment::new(
            text,
            emotion,
            NarrationSource::Missing {
                reason: NarrationError::Absent,
            },
        )
    }

    #[test]
    fn test_keyword_fraction() {
        assert_eq!(keyword_fraction("The door creaked.", "door", 0), Some(4.0 / 17.0));
        assert_eq!(keyword_fraction("DOOR", "door", 0), Some(0.0));
        assert_eq!(keyword_fraction("door and door", "door", 1), Some(9.0 / 13.0));
        assert_eq!(keyword_fraction("door", "door", 1), None);
        assert_eq!(keyword_fraction("", "door", 0), None);
    }

    #[test]
    fn test_keyword_fraction_needs_whole_word() {
        // "indoors" holds "door" but is not the keyword
        assert_eq!(keyword_fraction("Stay indoors, shut the door", "door", 0), Some(23.0 / 27.0));
        assert_eq!(keyword_fraction("Stay indoors", "door", 0), None);
        assert_eq!(keyword_fraction("a door_frame", "door", 0), None);
        assert_eq!(keyword_fraction("(door)", "door", 0), Some(1.0 / 6.0));
    }

    #[test]
    fn test_clamp_offset() {
        assert_eq!(clamp_offset(2.8, 3.0, 0.5), 2.5);
        assert_eq!(clamp_offset(1.0, 3.0, 0.5), 1.0);
        // cue longer than the segment starts at zero
        assert_eq!(clamp_offset(0.4, 0.5, 2.0), 0.0);
    }

    #[test]
    fn test_build_two_segment_scenario() {
        let (dir, config) = populated_assets("timeline_scenario");
        let resolver = AssetResolver::from_config(&config);
        let builder = TimelineBuilder::new(&config, &resolver);

        let segments = vec![
            clip("The door creaked open", Emotion::Fear, 3.0).with_sfx(["door"]),
            clip("She smiled", Emotion::Joy, 2.0),
        ];
        let plan = builder.build(&segments);

        assert_eq!(plan.segments.len(), 2);
        assert!((plan.total_duration_s() - 5.5).abs() < 1e-9);
        assert_eq!(plan.segments[0].pause_after_s, 0.5);
        assert_eq!(plan.segments[1].pause_after_s, 0.0);

        let first = &plan.segments[0];
        assert_eq!(first.cues.len(), 1);
        assert_eq!(first.cues[0].tag, "door");
        assert!((first.cues[0].offset_s - 3.0 * 4.0 / 21.0).abs() < 1e-9);
        assert!(plan.segments[1].cues.is_empty());

        // fear.wav is 1s, so it loops under the 3s segment
        match &first.background {
            BackgroundLayer::Track { used, looped, fallback, .. } => {
                assert_eq!(*used, Some(Emotion::Fear));
                assert!(*looped);
                assert_eq!(*fallback, BackgroundFallback::Requested);
            }
            other => panic!("expected a background track, got {:?}", other),
        }
        // joy.wav is 2s, exactly covering the segment
        match &plan.segments[1].background {
            BackgroundLayer::Track { looped, .. } => assert!(!*looped),
            other => panic!("expected a background track, got {:?}", other),
        }
        assert!(plan.degradations().is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unmapped_sfx_is_skipped() {
        let (dir, config) = populated_assets("timeline_explosion");
        let resolver = AssetResolver::from_config(&config);
        let plan = TimelineBuilder::new(&config, &resolver)
            .build(&[clip("Boom.", Emotion::Joy, 1.0).with_sfx(["explosion", "door"])]);

        let seg = &plan.segments[0];
        assert_eq!(seg.cues.len(), 1);
        assert_eq!(seg.skipped_cues.len(), 1);
        assert_eq!(seg.skipped_cues[0].tag, "explosion");
        assert!(matches!(seg.skipped_cues[0].reason, SkipReason::Unresolved(_)));
        // door not in the text: placed at the fallback fraction, clamped to fit
        assert!((seg.cues[0].offset_s - 0.5).abs() < 1e-9);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_narration_gets_min_duration_and_layers() {
        let (dir, config) = populated_assets("timeline_missing");
        let resolver = AssetResolver::from_config(&config);
        let plan = TimelineBuilder::new(&config, &resolver)
            .build(&[missing("A scream in the night", Emotion::Fear).with_sfx(["scream"])]);

        let seg = &plan.segments[0];
        assert_eq!(seg.duration_s, config.min_segment_duration_s);
        assert!(seg.background.asset().is_some());
        assert_eq!(seg.cues.len(), 1);
        assert_eq!(plan.degradations().len(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_blank_text_with_sfx_gets_min_slot() {
        let (dir, config) = populated_assets("timeline_blank");
        let resolver = AssetResolver::from_config(&config);
        let plan = TimelineBuilder::new(&config, &resolver)
            .build(&[clip("  ", Emotion::Neutral, 0.2).with_sfx(["door"])]);
        assert_eq!(plan.segments[0].duration_s, config.min_segment_duration_s);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_zero_duration_has_no_layers() {
        let (dir, mut config) = populated_assets("timeline_zero");
        config.min_segment_duration_s = 0.0;
        let resolver = AssetResolver::from_config(&config);
        let plan = TimelineBuilder::new(&config, &resolver).build(&[
            missing("gone", Emotion::Joy).with_sfx(["door"]),
            clip("here", Emotion::Joy, 1.0),
        ]);

        let seg = &plan.segments[0];
        assert_eq!(seg.duration_s, 0.0);
        assert!(seg.background.asset().is_none());
        assert!(seg.cues.is_empty());
        assert_eq!(seg.skipped_cues[0].reason, SkipReason::EmptySlot);
        // only its pause remains
        assert!((plan.total_duration_s() - 1.5).abs() < 1e-9);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_background_falls_back_to_default_then_directory() {
        let (dir, mut config) = populated_assets("timeline_bg_fallback");
        // anger is unmapped; neutral is the default
        let resolver = AssetResolver::from_config(&config);
        let plan = TimelineBuilder::new(&config, &resolver).build(&[clip("grr", Emotion::Anger, 1.0)]);
        match &plan.segments[0].background {
            BackgroundLayer::Track { used, fallback, .. } => {
                assert_eq!(*used, Some(Emotion::Neutral));
                assert_eq!(*fallback, BackgroundFallback::DefaultEmotion);
            }
            other => panic!("unexpected {:?}", other),
        }

        // default also unmapped: first file in bg_music wins
        config.default_emotion = Emotion::Surprise;
        let resolver = AssetResolver::from_config(&config);
        let plan = TimelineBuilder::new(&config, &resolver).build(&[clip("grr", Emotion::Anger, 1.0)]);
        match &plan.segments[0].background {
            BackgroundLayer::Track { used, fallback, asset, .. } => {
                assert_eq!(*used, None);
                assert_eq!(*fallback, BackgroundFallback::DirectoryScan);
                assert_eq!(asset.path.as_ref().unwrap(), &dir.join("bg_music/fear.wav"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            plan.degradations()[0],
            crate::mix::plan::Degradation::BackgroundFallback { .. }
        ));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_no_background_anywhere() {
        let (dir, config) = populated_assets("timeline_no_bg");
        for name in ["joy", "fear", "neutral"] {
            std::fs::remove_file(dir.join(format!("bg_music/{}.wav", name))).unwrap();
        }
        // sfx still present, so the file source is used
        let resolver = AssetResolver::from_config(&config);
        let plan = TimelineBuilder::new(&config, &resolver).build(&[clip("hi", Emotion::Joy, 1.0)]);
        assert!(matches!(plan.segments[0].background, BackgroundLayer::None { .. }));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_repeated_tag_follows_each_occurrence() {
        let (dir, config) = populated_assets("timeline_repeat");
        let resolver = AssetResolver::from_config(&config);
        let text = "door slammed, another door slammed";
        let plan = TimelineBuilder::new(&config, &resolver)
            .build(&[clip(text, Emotion::Joy, 4.0).with_sfx(["door", "door"])]);
        let cues = &plan.segments[0].cues;
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].offset_s, 0.0);
        assert!(cues[1].offset_s > cues[0].offset_s);
        assert!(Arc::ptr_eq(&cues[0].asset, &cues[1].asset));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_build_chapters_lead_in_and_gap() {
        let (dir, config) = populated_assets("timeline_chapters");
        let resolver = AssetResolver::from_config(&config);
        let chapters = vec![
            Chapter {
                title: Some("One".into()),
                segments: vec![clip("a", Emotion::Joy, 1.0), clip("b", Emotion::Joy, 1.0)],
            },
            Chapter {
                title: None,
                segments: vec![],
            },
            Chapter {
                title: Some("Two".into()),
                segments: vec![clip("c", Emotion::Fear, 1.0)],
            },
        ];
        let plan = TimelineBuilder::new(&config, &resolver).build_chapters(&chapters);

        assert_eq!(plan.segments.len(), 3);
        assert_eq!(plan.segments[2].index, 2);
        assert_eq!(plan.segments[0].lead_in_s, 2.0);
        assert_eq!(plan.segments[0].pause_after_s, 0.5);
        assert_eq!(plan.segments[1].lead_in_s, 0.0);
        assert_eq!(plan.segments[1].pause_after_s, 3.0);
        assert_eq!(plan.segments[2].lead_in_s, 2.0);
        assert_eq!(plan.segments[2].pause_after_s, 0.0);
        // 2 + 1 + 0.5 + 1 + 3 + 2 + 1
        assert!((plan.total_duration_s() - 10.5).abs() < 1e-9);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_build_is_deterministic() {
        let (dir, config) = populated_assets("timeline_det");
        let resolver = AssetResolver::from_config(&config);
        let builder = TimelineBuilder::new(&config, &resolver);
        let segments = vec![clip("door", Emotion::Sadness, 2.0).with_sfx(["door", "scream"])];
        let a = builder.build(&segments);
        let b = builder.build(&segments);
        assert_eq!(a.total_duration_s(), b.total_duration_s());
        assert_eq!(a.degradations(), b.degradations());
        let offsets = |p: &MixPlan| p.segments[0].cues.iter().map(|c| c.offset_s).collect::<Vec<_>>();
        assert_eq!(offsets(&a), offsets(&b));

        std::fs::remove_dir_all(&dir).ok();
    }
}
