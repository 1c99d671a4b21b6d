//! Sample-level rendering of a [`MixPlan`].

use std::path::Path;
use std::sync::Arc;

use crate::audio::effects::{
    adjust_volume, fit_length, generate_silence, loop_to_length, normalize_peak, overlay, seconds_to_frames,
};
use crate::audio::io::load_audio;
use crate::config::MixConfig;
use crate::error::Result;
use crate::types::NarrationSource;

use super::export::{MixedTrack, TrackEncoder, WavEncoder};
use super::plan::{BackgroundLayer, MixPlan, PlannedSegment};

/// Mixed mono samples at the output sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTrack {
    pub samples: Vec<f64>,
    pub sample_rate: u32,
}

impl RenderedTrack {
    pub fn frames(&self) -> usize {
        self.samples.len()
    }

    pub fn duration_s(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Cut the track down to at most `seconds`.
    pub fn truncate_to(&mut self, seconds: f64) {
        let frames = seconds_to_frames(seconds, self.sample_rate);
        self.samples.truncate(frames);
    }
}

/// Renders plans and exports them through a [`TrackEncoder`].
pub struct AudioMixer<'a> {
    pub(super) config: &'a MixConfig,
    pub(super) encoder: Arc<dyn TrackEncoder>,
}

impl<'a> AudioMixer<'a> {
    pub fn new(config: &'a MixConfig) -> Self {
        Self {
            config,
            encoder: Arc::new(WavEncoder),
        }
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn TrackEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn render(&self, plan: &MixPlan) -> RenderedTrack {
        let sr = self.config.encoding.sample_rate;
        let mut samples = Vec::with_capacity(seconds_to_frames(plan.total_duration_s(), sr));

        for seg in &plan.segments {
            samples.extend(generate_silence(seconds_to_frames(seg.lead_in_s, sr)));
            samples.extend(self.render_segment(seg));
            samples.extend(generate_silence(seconds_to_frames(seg.pause_after_s, sr)));
        }

        if let Some(target) = self.config.peak_normalize_dbfs {
            normalize_peak(&mut samples, target);
        }

        let track = RenderedTrack { samples, sample_rate: sr };
        log::debug!(
            "Rendered {} segments: {:.3}s ({} frames)",
            plan.segments.len(),
            track.duration_s(),
            track.frames()
        );
        track
    }

    /// Render and export in one step.
    pub fn render_to_file(&self, plan: &MixPlan, output: &Path) -> Result<MixedTrack> {
        let track = self.render(plan);
        self.export(&track, output)
    }

    fn render_segment(&self, seg: &PlannedSegment) -> Vec<f64> {
        let sr = self.config.encoding.sample_rate;
        let frames = seconds_to_frames(seg.duration_s, sr);
        if frames == 0 {
            return Vec::new();
        }

        let mut buf = self.narration(seg, frames);

        if let BackgroundLayer::Track { asset, .. } = &seg.background {
            overlay(&mut buf, &loop_to_length(&asset.samples, frames), 0, self.config.bgm_gain_db);
        }
        for cue in &seg.cues {
            overlay(
                &mut buf,
                &cue.asset.samples,
                seconds_to_frames(cue.offset_s, sr),
                self.config.sfx_gain_db,
            );
        }
        buf
    }

    /// Narration fitted to `frames`, or silence.
    fn narration(&self, seg: &PlannedSegment, frames: usize) -> Vec<f64> {
        let path = match &seg.narration {
            NarrationSource::Clip { path, .. } => path,
            NarrationSource::Missing { .. } => return generate_silence(frames),
        };
        match load_audio(path, self.config.encoding.sample_rate) {
            Ok(mut samples) => {
                adjust_volume(&mut samples, self.config.narration_gain_db);
                fit_length(&samples, frames)
            }
            Err(e) => {
                log::warn!("Segment {}: narration unusable, using silence: {:#}", seg.index, e);
                generate_silence(frames)
            }
        }
    }
}
