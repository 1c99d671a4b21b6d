//! Fixtures shared by the unit tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::audio::io::write_wav;
use crate::config::{EncodingParams, MixConfig};
use crate::types::Emotion;

pub const TEST_SR: u32 = 8000;

/// Fresh per-test directory under the system temp dir.
pub fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("taleweave_{}_{}", name, std::process::id()));
    std::fs::remove_dir_all(&dir).ok();
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// 440 Hz sine at 0.3 amplitude.
pub fn tone(duration_s: f64, sr: u32) -> Vec<f64> {
    let n = (duration_s * sr as f64).round() as usize;
    (0..n)
        .map(|i| (2.0 * std::f64::consts::PI * 440.0 * i as f64 / sr as f64).sin() * 0.3)
        .collect()
}

/// Seeded white noise at 0.2 amplitude.
pub fn noise(duration_s: f64, sr: u32, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = (duration_s * sr as f64).round() as usize;
    (0..n).map(|_| rng.gen_range(-0.2..0.2)).collect()
}

pub fn write_tone(path: &Path, duration_s: f64, sr: u32) -> PathBuf {
    write_wav(path, &tone(duration_s, sr), sr).unwrap();
    path.to_path_buf()
}

pub fn write_noise(path: &Path, duration_s: f64, sr: u32, seed: u64) -> PathBuf {
    write_wav(path, &noise(duration_s, sr, seed), sr).unwrap();
    path.to_path_buf()
}

/// Temp dir with empty `bg_music/` and `sfx/` plus a mono 8 kHz config.
///
/// Backgrounds are mapped for joy, fear and neutral; SFX for door and scream.
/// No files are written.
pub fn asset_config(name: &str) -> (PathBuf, MixConfig) {
    let dir = temp_dir(name);
    std::fs::create_dir_all(dir.join("bg_music")).unwrap();
    std::fs::create_dir_all(dir.join("sfx")).unwrap();

    let mut background = BTreeMap::new();
    background.insert(Emotion::Joy, PathBuf::from("joy.wav"));
    background.insert(Emotion::Fear, PathBuf::from("fear.wav"));
    background.insert(Emotion::Neutral, PathBuf::from("neutral.wav"));

    let mut sfx = BTreeMap::new();
    sfx.insert("door".to_string(), PathBuf::from("door.wav"));
    sfx.insert("scream".to_string(), PathBuf::from("scream.wav"));

    let config = MixConfig {
        asset_root: dir.clone(),
        background,
        sfx,
        min_output_bytes: 100,
        export_timeout_s: 30.0,
        encoding: EncodingParams {
            sample_rate: TEST_SR,
            channels: 1,
            bits_per_sample: 16,
        },
        ..MixConfig::default()
    };
    (dir, config)
}

/// [`asset_config`] with every mapped file written.
///
/// joy 2.0s, fear 1.0s (shorter than most segments, so it loops),
/// neutral 4.0s, door 0.5s, scream 0.25s.
pub fn populated_assets(name: &str) -> (PathBuf, MixConfig) {
    let (dir, config) = asset_config(name);
    write_noise(&dir.join("bg_music/joy.wav"), 2.0, TEST_SR, 1);
    write_noise(&dir.join("bg_music/fear.wav"), 1.0, TEST_SR, 2);
    write_noise(&dir.join("bg_music/neutral.wav"), 4.0, TEST_SR, 3);
    write_tone(&dir.join("sfx/door.wav"), 0.5, TEST_SR);
    write_tone(&dir.join("sfx/scream.wav"), 0.25, TEST_SR);
    (dir, config)
}
