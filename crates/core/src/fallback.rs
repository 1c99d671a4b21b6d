//! Narration validation and fallback.
//!
//! Every problem with a narration clip becomes a [`NarrationSource::Missing`]
//! with a reason; the timeline then gives the segment a silent slot.

use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::audio::io::probe_duration;
use crate::config::MixConfig;
use crate::error::NarrationError;
use crate::types::{Emotion, NarrationSource, Segment, SegmentInput};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Check a narration file and report it as a clip or as missing.
pub fn probe_narration(path: Option<&Path>, config: &MixConfig) -> NarrationSource {
    let missing = |reason: NarrationError| NarrationSource::Missing { reason };
    let path = match path {
        Some(p) => p,
        None => return missing(NarrationError::Absent),
    };

    let size = match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => return missing(NarrationError::Missing(path.to_path_buf())),
    };
    if size <= config.min_narration_bytes {
        return missing(NarrationError::TooSmall {
            path: path.to_path_buf(),
            size,
        });
    }

    match probe_duration(path) {
        Ok(d) if d > 0.0 => NarrationSource::Clip {
            path: path.to_path_buf(),
            duration_s: d,
        },
        Ok(_) => missing(NarrationError::Empty(path.to_path_buf())),
        Err(e) => missing(NarrationError::Unreadable {
            path: path.to_path_buf(),
            reason: format!("{:#}", e),
        }),
    }
}

/// Poll `path` until it probes as a usable clip or `timeout` elapses.
pub fn wait_for_narration(path: &Path, timeout: Duration, config: &MixConfig) -> NarrationSource {
    let deadline = Instant::now() + timeout;
    loop {
        let probed = probe_narration(Some(path), config);
        if matches!(probed, NarrationSource::Clip { .. }) {
            return probed;
        }
        let now = Instant::now();
        if now >= deadline {
            log::warn!("Narration {} not ready after {:?}", path.display(), timeout);
            return NarrationSource::Missing {
                reason: NarrationError::TimedOut(timeout),
            };
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

/// Text-to-speech collaborator.
pub trait SpeechSynthesizer: Send + Sync {
    /// Write narration for `text` to `dest`.
    fn synthesize(&self, text: &str, dest: &Path) -> Result<()>;
}

/// Run `synth` on a worker thread and probe what it wrote.
///
/// The wait is abandoned after `timeout`; the worker is not interrupted.
pub fn synthesize_with_timeout(
    synth: Arc<dyn SpeechSynthesizer>,
    text: &str,
    dest: &Path,
    timeout: Duration,
    config: &MixConfig,
) -> NarrationSource {
    let (tx, rx) = mpsc::channel();
    let text = text.to_string();
    let worker_dest: PathBuf = dest.to_path_buf();

    std::thread::spawn(move || {
        let _ = tx.send(synth.synthesize(&text, &worker_dest));
    });

    let reason = match rx.recv_timeout(timeout) {
        Ok(Ok(())) => return probe_narration(Some(dest), config),
        Ok(Err(e)) => NarrationError::SynthesisFailed(format!("{:#}", e)),
        Err(mpsc::RecvTimeoutError::Timeout) => NarrationError::TimedOut(timeout),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            NarrationError::SynthesisFailed("synthesizer stopped without a result".into())
        }
    };
    log::warn!("Synthesis for {} failed: {}", dest.display(), reason);
    NarrationSource::Missing { reason }
}

/// Convert collaborator input into segments.
pub fn resolve_segments(inputs: &[SegmentInput], config: &MixConfig) -> Vec<Segment> {
    inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let emotion = Emotion::parse_lossy(input.emotion.as_deref(), config.default_emotion);
            let narration = probe_narration(input.audio_file.as_deref(), config);
            if let NarrationSource::Missing { reason } = &narration {
                log::warn!("Segment {}: {}", i, reason);
            }
            Segment::new(input.text.clone(), emotion, narration).with_sfx(&input.sfx_tags)
        })
        .collect()
}
