//! Mixer configuration: asset tables, gains, timing and export thresholds.
//!
//! Built once (from JSON or `Default`) and passed by reference into the
//! resolver, the timeline builder and the mixer. Nothing in the core reads
//! configuration from globals or the environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;
use crate::types::{normalize_sfx_id, Emotion};

/// Lowest gain a background or SFX layer may be set to.
pub const MIN_GAIN_DB: f64 = -60.0;

/// Non-primary layers sit at least this far below narration.
pub const MIN_ATTENUATION_DB: f64 = 1.0;

lazy_static::lazy_static! {
    /// Background file per emotion, relative to the background directory.
    static ref DEFAULT_BACKGROUND: BTreeMap<Emotion, &'static str> = {
        let mut m = BTreeMap::new();
        m.insert(Emotion::Joy, "joy.mp3");
        m.insert(Emotion::Sadness, "sadness.mp3");
        m.insert(Emotion::Anger, "sadness.mp3");
        m.insert(Emotion::Fear, "sadness.mp3");
        m.insert(Emotion::Surprise, "joy.mp3");
        m.insert(Emotion::Neutral, "sadness.mp3");
        m
    };

    /// SFX identifiers shipped with the default asset pack.
    static ref DEFAULT_SFX: BTreeMap<&'static str, &'static str> = {
        let mut m = BTreeMap::new();
        for id in ["door", "footsteps", "thunder", "water", "fire", "scream"] {
            m.insert(id, id);
        }
        m
    };
}

/// Where an SFX cue lands inside its segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum SfxOffsetPolicy {
    /// Place the cue where the tag's word appears in the text, as a fraction
    /// of the text length; `fallback_fraction` when the word is not found.
    KeywordPosition { fallback_fraction: f64 },
    /// Always place the cue at `fraction` of the segment.
    Fixed { fraction: f64 },
}

impl Default for SfxOffsetPolicy {
    fn default() -> Self {
        SfxOffsetPolicy::KeywordPosition {
            fallback_fraction: 0.5,
        }
    }
}

/// Output encoding. PCM WAV, so the bitrate follows from the other three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingParams {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl Default for EncodingParams {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            channels: 2,
            bits_per_sample: 16,
        }
    }
}

impl EncodingParams {
    pub fn bitrate_kbps(&self) -> u32 {
        self.sample_rate * self.channels as u32 * self.bits_per_sample as u32 / 1000
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixConfig {
    /// Base directory for relative asset paths.
    pub asset_root: PathBuf,
    /// Background music directory (relative to `asset_root`).
    pub bgm_dir: PathBuf,
    /// Sound effect directory (relative to `asset_root`).
    pub sfx_dir: PathBuf,
    #[serde(deserialize_with = "deserialize_background")]
    pub background: BTreeMap<Emotion, PathBuf>,
    #[serde(deserialize_with = "deserialize_sfx")]
    pub sfx: BTreeMap<String, PathBuf>,
    pub default_emotion: Emotion,

    pub narration_gain_db: f64,
    pub bgm_gain_db: f64,
    pub sfx_gain_db: f64,

    /// Silence between consecutive segments (seconds).
    pub pause_s: f64,
    /// Slot length for segments without usable narration (seconds).
    pub min_segment_duration_s: f64,
    pub chapter_title_pause_s: f64,
    pub chapter_gap_s: f64,
    pub sfx_offset: SfxOffsetPolicy,

    pub min_output_bytes: u64,
    pub min_output_duration_s: f64,
    pub export_timeout_s: f64,
    /// Narration files at or below this size are treated as absent.
    pub min_narration_bytes: u64,

    pub encoding: EncodingParams,
    /// Scale the finished mix so its peak sits at this level. Off when `None`.
    pub peak_normalize_dbfs: Option<f64>,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("assets"),
            bgm_dir: PathBuf::from("bg_music"),
            sfx_dir: PathBuf::from("sfx"),
            background: DEFAULT_BACKGROUND
                .iter()
                .map(|(e, f)| (*e, PathBuf::from(f)))
                .collect(),
            sfx: DEFAULT_SFX
                .iter()
                .map(|(id, stem)| (id.to_string(), PathBuf::from(format!("{}.mp3", stem))))
                .collect(),
            default_emotion: Emotion::Neutral,
            narration_gain_db: 0.0,
            bgm_gain_db: -20.0,
            sfx_gain_db: -8.0,
            pause_s: 0.5,
            min_segment_duration_s: 1.0,
            chapter_title_pause_s: 2.0,
            chapter_gap_s: 3.0,
            sfx_offset: SfxOffsetPolicy::default(),
            min_output_bytes: 1024,
            min_output_duration_s: 0.1,
            export_timeout_s: 120.0,
            min_narration_bytes: 44,
            encoding: EncodingParams::default(),
            peak_normalize_dbfs: None,
        }
    }
}

fn deserialize_background<'de, D>(d: D) -> Result<BTreeMap<Emotion, PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, PathBuf> = BTreeMap::deserialize(d)?;
    let mut out = BTreeMap::new();
    for (label, path) in raw {
        match label.parse::<Emotion>() {
            Ok(emotion) => {
                out.insert(emotion, path);
            }
            Err(e) => log::warn!("Ignoring background mapping: {}", e),
        }
    }
    Ok(out)
}

fn deserialize_sfx<'de, D>(d: D) -> Result<BTreeMap<String, PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, PathBuf> = BTreeMap::deserialize(d)?;
    Ok(raw
        .into_iter()
        .filter_map(|(id, path)| normalize_sfx_id(&id).map(|id| (id, path)))
        .collect())
}

impl MixConfig {
    /// Load and validate a JSON config file.
    ///
    /// A relative `asset_root` is resolved against the config file's directory.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: MixConfig =
            serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if config.asset_root.is_relative() {
            if let Some(parent) = path.parent() {
                config.asset_root = parent.join(&config.asset_root);
            }
        }
        config.validate()?;
        config.warn_missing_assets();
        Ok(config)
    }

    /// Check hard constraints. Missing asset files are only warnings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        let enc = &self.encoding;
        if !(8000..=192_000).contains(&enc.sample_rate) {
            return invalid(format!("sample_rate {} out of range", enc.sample_rate));
        }
        if enc.channels == 0 || enc.channels > 8 {
            return invalid(format!("channels {} out of range", enc.channels));
        }
        if ![16, 24, 32].contains(&enc.bits_per_sample) {
            return invalid(format!("bits_per_sample {} unsupported", enc.bits_per_sample));
        }

        if !self.narration_gain_db.is_finite() {
            return invalid("narration_gain_db must be finite".into());
        }
        let ceiling = self.narration_gain_db - MIN_ATTENUATION_DB;
        for (name, gain) in [("bgm_gain_db", self.bgm_gain_db), ("sfx_gain_db", self.sfx_gain_db)] {
            if !gain.is_finite() || gain < MIN_GAIN_DB || gain > ceiling {
                return invalid(format!(
                    "{} = {} must lie in [{}, {}] (below narration)",
                    name, gain, MIN_GAIN_DB, ceiling
                ));
            }
        }
        if self.sfx_gain_db < self.bgm_gain_db {
            log::warn!(
                "sfx_gain_db ({}) is below bgm_gain_db ({}); effects may be masked",
                self.sfx_gain_db,
                self.bgm_gain_db
            );
        }

        for (name, secs) in [
            ("pause_s", self.pause_s),
            ("min_segment_duration_s", self.min_segment_duration_s),
            ("chapter_title_pause_s", self.chapter_title_pause_s),
            ("chapter_gap_s", self.chapter_gap_s),
            ("min_output_duration_s", self.min_output_duration_s),
        ] {
            if !secs.is_finite() || secs < 0.0 {
                return invalid(format!("{} must be a non-negative number of seconds", name));
            }
        }
        if self.export_timeout_s <= 0.0 || Duration::try_from_secs_f64(self.export_timeout_s).is_err() {
            return invalid(format!(
                "export_timeout_s = {} must be a positive, representable number of seconds",
                self.export_timeout_s
            ));
        }

        let fraction = match self.sfx_offset {
            SfxOffsetPolicy::KeywordPosition { fallback_fraction } => fallback_fraction,
            SfxOffsetPolicy::Fixed { fraction } => fraction,
        };
        if !(0.0..=1.0).contains(&fraction) {
            return invalid(format!("sfx offset fraction {} outside [0, 1]", fraction));
        }

        if let Some(peak) = self.peak_normalize_dbfs {
            if !peak.is_finite() || peak > 0.0 {
                return invalid(format!("peak_normalize_dbfs {} must be <= 0", peak));
            }
        }
        Ok(())
    }

    /// Log a warning for every mapped asset file that does not exist.
    pub fn warn_missing_assets(&self) {
        for emotion in self.background.keys() {
            if let Some(path) = self.background_path(*emotion) {
                if !path.is_file() {
                    log::warn!("Background for '{}' not found: {}", emotion, path.display());
                }
            }
        }
        for id in self.sfx.keys() {
            if let Some(path) = self.sfx_path(id) {
                if !path.is_file() {
                    log::warn!("SFX '{}' not found: {}", id, path.display());
                }
            }
        }
    }

    /// Set background and SFX gains, clamped into the allowed range.
    ///
    /// When narration is so quiet that no gain fits below it, both layers
    /// land on `MIN_GAIN_DB` and `validate` reports the conflict.
    pub fn with_gains(mut self, bgm_gain_db: f64, sfx_gain_db: f64) -> Self {
        let ceiling = if self.narration_gain_db.is_finite() {
            (self.narration_gain_db - MIN_ATTENUATION_DB).max(MIN_GAIN_DB)
        } else {
            MIN_GAIN_DB
        };
        self.bgm_gain_db = bgm_gain_db.clamp(MIN_GAIN_DB, ceiling);
        self.sfx_gain_db = sfx_gain_db.clamp(MIN_GAIN_DB, ceiling);
        log::info!(
            "Gains set: BGM {:.1} dB, SFX {:.1} dB",
            self.bgm_gain_db,
            self.sfx_gain_db
        );
        self
    }

    pub fn bgm_dir_path(&self) -> PathBuf {
        self.asset_root.join(&self.bgm_dir)
    }

    pub fn sfx_dir_path(&self) -> PathBuf {
        self.asset_root.join(&self.sfx_dir)
    }

    /// Mapped background file for an emotion, resolved to a full path.
    pub fn background_path(&self, emotion: Emotion) -> Option<PathBuf> {
        self.background
            .get(&emotion)
            .map(|p| self.bgm_dir_path().join(p))
    }

    /// Explicitly mapped SFX file, resolved to a full path.
    pub fn sfx_path(&self, id: &str) -> Option<PathBuf> {
        self.sfx.get(id).map(|p| self.sfx_dir_path().join(p))
    }

    /// `Duration::MAX` when the configured value does not fit a `Duration`.
    pub fn export_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.export_timeout_s).unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = MixConfig::default();
        config.validate().unwrap();
        assert!(config.bgm_gain_db < config.narration_gain_db);
        assert!(config.sfx_gain_db > config.bgm_gain_db);
        assert_eq!(config.background.len(), Emotion::ALL.len());
        assert!(config.sfx.contains_key("door"));
    }

    #[test]
    fn test_default_paths() {
        let config = MixConfig::default();
        assert_eq!(
            config.background_path(Emotion::Fear).unwrap(),
            PathBuf::from("assets/bg_music/sadness.mp3")
        );
        assert_eq!(
            config.sfx_path("door").unwrap(),
            PathBuf::from("assets/sfx/door.mp3")
        );
        assert!(config.sfx_path("explosion").is_none());
    }

    #[test]
    fn test_rejects_gain_above_narration() {
        let mut config = MixConfig::default();
        config.bgm_gain_db = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = MixConfig::default();
        config.sfx_gain_db = -80.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_with_gains_clamps() {
        let config = MixConfig::default().with_gains(5.0, -200.0);
        assert_eq!(config.bgm_gain_db, -MIN_ATTENUATION_DB);
        assert_eq!(config.sfx_gain_db, MIN_GAIN_DB);
        config.validate().unwrap();
    }

    #[test]
    fn test_with_gains_under_quiet_narration() {
        let config = MixConfig {
            narration_gain_db: -70.0,
            ..MixConfig::default()
        }
        .with_gains(-20.0, -8.0);
        assert_eq!(config.bgm_gain_db, MIN_GAIN_DB);
        assert_eq!(config.sfx_gain_db, MIN_GAIN_DB);
        assert!(config.validate().is_err());

        let config = MixConfig {
            narration_gain_db: f64::NAN,
            ..MixConfig::default()
        }
        .with_gains(-20.0, -8.0);
        assert_eq!(config.bgm_gain_db, MIN_GAIN_DB);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unrepresentable_timeout() {
        let mut config = MixConfig::default();
        config.export_timeout_s = 1e20;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(config.export_timeout(), Duration::MAX);

        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            config.export_timeout_s = bad;
            assert!(config.validate().is_err(), "accepted {}", bad);
        }

        config.export_timeout_s = 0.25;
        config.validate().unwrap();
        assert_eq!(config.export_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_rejects_bad_encoding() {
        let mut config = MixConfig::default();
        config.encoding.bits_per_sample = 12;
        assert!(config.validate().is_err());

        let mut config = MixConfig::default();
        config.encoding.channels = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_negative_pause() {
        let mut config = MixConfig::default();
        config.pause_s = -0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bitrate() {
        let enc = EncodingParams::default();
        assert_eq!(enc.bitrate_kbps(), 705);
    }

    #[test]
    fn test_from_json_file() {
        let dir = std::env::temp_dir().join(format!("taleweave_config_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("mix.json");
        std::fs::write(
            &path,
            r#"{
                "asset_root": "pack",
                "background": {"joy": "happy.wav", "melancholy": "x.wav"},
                "sfx": {" Door ": "door.wav"},
                "pause_s": 0.25,
                "sfx_offset": {"policy": "fixed", "fraction": 0.0},
                "encoding": {"sample_rate": 16000, "channels": 1}
            }"#,
        )
        .unwrap();

        let config = MixConfig::from_json_file(&path).unwrap();
        assert_eq!(config.asset_root, dir.join("pack"));
        // unknown emotion labels are dropped, not fatal
        assert_eq!(config.background.len(), 1);
        assert!(config.sfx.contains_key("door"));
        assert_eq!(config.pause_s, 0.25);
        assert_eq!(config.sfx_offset, SfxOffsetPolicy::Fixed { fraction: 0.0 });
        assert_eq!(config.encoding.sample_rate, 16000);
        assert_eq!(config.encoding.bits_per_sample, 16);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_from_json_file_parse_error() {
        let dir = std::env::temp_dir().join(format!("taleweave_config_bad_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            MixConfig::from_json_file(&path),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            MixConfig::from_json_file(&dir.join("missing.json")),
            Err(ConfigError::Read { .. })
        ));

        std::fs::remove_dir_all(&dir).ok();
    }
}
