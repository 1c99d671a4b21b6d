//! Top-level entry points: segments in, mixed file out.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;

use crate::assets::{AssetKind, AssetResolver};
use crate::audio::io::{probe_duration, probe_format};
use crate::config::MixConfig;
use crate::error::{MixError, Result};
use crate::fallback::resolve_segments;
use crate::mix::{AudioMixer, Degradation, MixPlan, MixedTrack, TimelineBuilder};
use crate::types::{Chapter, ChapterInput, Segment, SegmentInput};

/// Outcome of a successful mix.
#[derive(Debug, Clone)]
pub struct MixReport {
    pub plan: MixPlan,
    pub track: MixedTrack,
    pub degradations: Vec<Degradation>,
}

/// Mix `inputs` into one file at `output`.
pub fn mix_audio(inputs: &[SegmentInput], output: &Path, config: &MixConfig) -> Result<MixReport> {
    check_request(inputs.is_empty(), output, config)?;
    let start = Instant::now();
    log::info!("Mixing {} segments into {}", inputs.len(), output.display());

    let segments = resolve_segments(inputs, config);
    let resolver = AssetResolver::from_config(config);
    resolver.prefetch(&asset_keys(&segments, config));

    let plan = TimelineBuilder::new(config, &resolver).build(&segments);
    finish(plan, output, config, start)
}

/// Mix chapters into one file, with title lead-ins and chapter gaps.
pub fn mix_chapters(chapters: &[ChapterInput], output: &Path, config: &MixConfig) -> Result<MixReport> {
    let total: usize = chapters.iter().map(|c| c.segments.len()).sum();
    check_request(total == 0, output, config)?;
    let start = Instant::now();
    log::info!(
        "Mixing {} chapters ({} segments) into {}",
        chapters.len(),
        total,
        output.display()
    );

    let chapters: Vec<Chapter> = chapters
        .iter()
        .map(|c| Chapter {
            title: c.title.clone(),
            segments: resolve_segments(&c.segments, config),
        })
        .collect();
    let all: Vec<Segment> = chapters.iter().flat_map(|c| c.segments.iter().cloned()).collect();

    let resolver = AssetResolver::from_config(config);
    resolver.prefetch(&asset_keys(&all, config));

    let plan = TimelineBuilder::new(config, &resolver).build_chapters(&chapters);
    finish(plan, output, config, start)
}

/// Mix a single segment and keep only its first `seconds`.
///
/// The shortened file still has to pass output validation.
pub fn preview_mix(input: &SegmentInput, output: &Path, seconds: f64, config: &MixConfig) -> Result<MixReport> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(MixError::InvalidInput(format!(
            "preview length must be positive, got {}",
            seconds
        )));
    }
    check_request(false, output, config)?;

    let segments = resolve_segments(std::slice::from_ref(input), config);
    let resolver = AssetResolver::from_config(config);
    let plan = TimelineBuilder::new(config, &resolver).build(&segments);

    let mixer = AudioMixer::new(config);
    let mut rendered = mixer.render(&plan);
    rendered.truncate_to(seconds);
    let track = mixer.export(&rendered, output)?;
    log::info!("Preview: {:.2}s of {:.2}s", track.duration_s, plan.total_duration_s());

    let degradations = plan.degradations();
    Ok(MixReport {
        plan,
        track,
        degradations,
    })
}

fn check_request(empty: bool, output: &Path, config: &MixConfig) -> Result<()> {
    if empty {
        return Err(MixError::InvalidInput("no segments to mix".into()));
    }
    if output.as_os_str().is_empty() {
        return Err(MixError::InvalidInput("output path is empty".into()));
    }
    config.validate()?;
    Ok(())
}

fn finish(plan: MixPlan, output: &Path, config: &MixConfig, start: Instant) -> Result<MixReport> {
    let track = AudioMixer::new(config).render_to_file(&plan, output)?;

    let degradations = plan.degradations();
    for d in &degradations {
        log::warn!("{}", d);
    }
    log::info!(
        "Mixed {} segments ({:.2}s, {} degradation(s)) in {:.1}s",
        plan.segments.len(),
        track.duration_s,
        degradations.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(MixReport {
        plan,
        track,
        degradations,
    })
}

/// Every asset key the segments will ask for.
fn asset_keys(segments: &[Segment], config: &MixConfig) -> Vec<(AssetKind, String)> {
    let mut keys = BTreeSet::new();
    keys.insert((AssetKind::Background, config.default_emotion.to_string()));
    for seg in segments {
        keys.insert((AssetKind::Background, seg.emotion.to_string()));
        for tag in &seg.sfx_tags {
            keys.insert((AssetKind::Sfx, tag.clone()));
        }
    }
    keys.into_iter().collect()
}

/// Basic facts about an audio file.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioInfo {
    pub path: PathBuf,
    pub duration_s: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub file_size: u64,
}

impl AudioInfo {
    /// Duration as `mm:ss.mmm`.
    pub fn timecode(&self) -> String {
        format_timecode(self.duration_s)
    }
}

pub fn audio_info(path: &Path) -> anyhow::Result<AudioInfo> {
    let file_size = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();
    let (sample_rate, channels) = probe_format(path)?;
    let duration_s = probe_duration(path)?;
    Ok(AudioInfo {
        path: path.to_path_buf(),
        duration_s,
        sample_rate,
        channels,
        file_size,
    })
}

pub fn format_timecode(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    format!(
        "{:02}:{:02}.{:03}",
        total_ms / 60_000,
        (total_ms / 1000) % 60,
        total_ms % 1000
    )
}
