//! Sample-level operations used by the mixer: silence, gain, trimming,
//! looping, overlay and peak normalization.

/// Convert seconds to a whole number of frames at `sr`.
pub fn seconds_to_frames(seconds: f64, sr: u32) -> usize {
    if seconds <= 0.0 {
        return 0;
    }
    (seconds * sr as f64).round() as usize
}

/// Generate `frames` samples of silence.
pub fn generate_silence(frames: usize) -> Vec<f64> {
    vec![0.0; frames]
}

/// Linear gain factor for a decibel value.
pub fn db_to_gain(db: f64) -> f64 {
    10.0f64.powf(db / 20.0)
}

/// Adjust volume by dB amount. Modifies samples in place.
pub fn adjust_volume(samples: &mut [f64], db: f64) {
    if db.abs() < 0.01 {
        return;
    }
    let gain = db_to_gain(db);
    for sample in samples.iter_mut() {
        *sample *= gain;
    }
}

/// Trim or zero-pad `samples` to exactly `frames` long.
pub fn fit_length(samples: &[f64], frames: usize) -> Vec<f64> {
    let mut out = samples[..frames.min(samples.len())].to_vec();
    out.resize(frames, 0.0);
    out
}

/// Repeat `samples` from the start until `frames` are covered, then trim.
///
/// Returns silence when the source is empty.
pub fn loop_to_length(samples: &[f64], frames: usize) -> Vec<f64> {
    if samples.is_empty() {
        return generate_silence(frames);
    }
    samples.iter().copied().cycle().take(frames).collect()
}

/// Add `layer` into `base` starting at `offset`, scaled by `gain_db`.
///
/// The layer never extends `base`; anything past its end is dropped.
pub fn overlay(base: &mut [f64], layer: &[f64], offset: usize, gain_db: f64) {
    if offset >= base.len() {
        return;
    }
    let gain = db_to_gain(gain_db);
    for (dst, src) in base[offset..].iter_mut().zip(layer) {
        *dst += src * gain;
    }
}

/// Absolute peak of the signal.
pub fn peak(samples: &[f64]) -> f64 {
    samples.iter().fold(0.0f64, |m, s| m.max(s.abs()))
}

/// Scale the whole signal so its peak sits at `target_dbfs`.
///
/// Silent input is left untouched.
pub fn normalize_peak(samples: &mut [f64], target_dbfs: f64) {
    let current = peak(samples);
    if current < 1e-9 {
        return;
    }
    let gain = db_to_gain(target_dbfs) / current;
    for sample in samples.iter_mut() {
        *sample *= gain;
    }
}
