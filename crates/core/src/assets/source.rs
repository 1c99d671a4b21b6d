//! Where asset bytes come from.
//!
//! `FileAssetSource` follows the configured tables and directory naming
//! conventions. `SilentAssetSource` answers every key with silence, so the
//! pipeline keeps one code path when no asset pack is installed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{AssetKind, AudioAsset};
use crate::audio::io::{is_supported_audio, load_audio};
use crate::config::MixConfig;
use crate::error::AssetError;
use crate::types::Emotion;

/// Key under which the directory-scan background is cached.
pub const ANY_BACKGROUND_KEY: &str = "*";

/// Backend that turns a logical key into decoded audio.
pub trait AssetSource: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Load one asset. Called at most once per key by the resolver.
    fn load(&self, kind: AssetKind, key: &str) -> Result<AudioAsset, AssetError>;

    /// Any usable background track, for when the emotion tables fail.
    fn load_any_background(&self) -> Result<AudioAsset, AssetError>;
}

/// Assets read from the files named in [`MixConfig`].
pub struct FileAssetSource {
    background: BTreeMap<Emotion, PathBuf>,
    sfx: BTreeMap<String, PathBuf>,
    bgm_dir: PathBuf,
    sfx_dir: PathBuf,
    sample_rate: u32,
}

impl FileAssetSource {
    pub fn new(config: &MixConfig) -> Self {
        Self {
            background: config
                .background
                .keys()
                .filter_map(|e| config.background_path(*e).map(|p| (*e, p)))
                .collect(),
            sfx: config
                .sfx
                .keys()
                .filter_map(|id| config.sfx_path(id).map(|p| (id.clone(), p)))
                .collect(),
            bgm_dir: config.bgm_dir_path(),
            sfx_dir: config.sfx_dir_path(),
            sample_rate: config.encoding.sample_rate,
        }
    }

    fn decode(&self, kind: AssetKind, key: &str, path: &Path) -> Result<AudioAsset, AssetError> {
        let unreadable = |reason: String| AssetError::Unreadable {
            kind,
            key: key.to_string(),
            path: path.to_path_buf(),
            reason,
        };

        let meta = std::fs::metadata(path).map_err(|e| unreadable(e.to_string()))?;
        if !meta.is_file() {
            return Err(unreadable("not a regular file".into()));
        }
        if meta.len() == 0 {
            return Err(unreadable("zero-length file".into()));
        }

        let samples = load_audio(path, self.sample_rate).map_err(|e| unreadable(format!("{:#}", e)))?;
        if samples.is_empty() {
            return Err(unreadable("no audio decoded".into()));
        }

        log::debug!(
            "Loaded {} '{}' from {} ({:.2}s)",
            kind,
            key,
            path.display(),
            samples.len() as f64 / self.sample_rate as f64
        );
        Ok(AudioAsset {
            kind,
            key: key.to_string(),
            path: Some(path.to_path_buf()),
            samples,
            sample_rate: self.sample_rate,
        })
    }

    /// SFX file for `id` by directory convention, if any.
    ///
    /// Tries `<id>.wav`, `<id>.mp3`, `<id>_001.mp3`, `<id>_1.mp3`, then the
    /// first audio file whose name contains `<id>`.
    fn find_sfx_file(&self, id: &str) -> Option<PathBuf> {
        let candidates = [
            format!("{}.wav", id),
            format!("{}.mp3", id),
            format!("{}_001.mp3", id),
            format!("{}_1.mp3", id),
        ];
        if let Some(found) = candidates
            .iter()
            .map(|name| self.sfx_dir.join(name))
            .find(|p| p.is_file())
        {
            return Some(found);
        }

        audio_files_in(&self.sfx_dir).into_iter().find(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().to_ascii_lowercase().contains(id))
                .unwrap_or(false)
        })
    }
}

impl AssetSource for FileAssetSource {
    fn name(&self) -> &str {
        "files"
    }

    fn load(&self, kind: AssetKind, key: &str) -> Result<AudioAsset, AssetError> {
        let not_found = || AssetError::NotFound {
            kind,
            key: key.to_string(),
        };

        let path = match kind {
            AssetKind::Background => {
                let emotion: Emotion = key.parse().map_err(|_| not_found())?;
                self.background.get(&emotion).cloned().ok_or_else(not_found)?
            }
            AssetKind::Sfx => match self.sfx.get(key) {
                Some(p) => p.clone(),
                None => self.find_sfx_file(key).ok_or_else(not_found)?,
            },
        };

        self.decode(kind, key, &path)
    }

    fn load_any_background(&self) -> Result<AudioAsset, AssetError> {
        for path in audio_files_in(&self.bgm_dir) {
            match self.decode(AssetKind::Background, ANY_BACKGROUND_KEY, &path) {
                Ok(asset) => return Ok(asset),
                Err(e) => log::debug!("Skipping fallback background: {}", e),
            }
        }
        Err(AssetError::NotFound {
            kind: AssetKind::Background,
            key: ANY_BACKGROUND_KEY.to_string(),
        })
    }
}

/// Sorted list of supported audio files directly inside `dir`.
fn audio_files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_supported_audio(p))
            .collect(),
        Err(_) => Vec::new(),
    };
    files.sort();
    files
}

/// Null source: every key resolves to silence.
pub struct SilentAssetSource {
    sample_rate: u32,
    duration_s: f64,
}

impl SilentAssetSource {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            duration_s: 1.0,
        }
    }

    fn silence(&self, kind: AssetKind, key: &str) -> AudioAsset {
        AudioAsset {
            kind,
            key: key.to_string(),
            path: None,
            samples: vec![0.0; (self.duration_s * self.sample_rate as f64).round() as usize],
            sample_rate: self.sample_rate,
        }
    }
}

impl AssetSource for SilentAssetSource {
    fn name(&self) -> &str {
        "silent"
    }

    fn load(&self, kind: AssetKind, key: &str) -> Result<AudioAsset, AssetError> {
        Ok(self.silence(kind, key))
    }

    fn load_any_background(&self) -> Result<AudioAsset, AssetError> {
        Ok(self.silence(AssetKind::Background, ANY_BACKGROUND_KEY))
    }
}

/// One mapped asset and whether its file exists.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetStatus {
    pub kind: AssetKind,
    pub key: String,
    pub path: PathBuf,
    pub present: bool,
}

/// Startup check of which configured assets are on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetAvailability {
    pub assets: Vec<AssetStatus>,
    /// Audio files found in the background directory.
    pub background_dir_files: usize,
}

impl AssetAvailability {
    pub fn probe(config: &MixConfig) -> Self {
        let mut assets = Vec::new();
        for emotion in config.background.keys() {
            if let Some(path) = config.background_path(*emotion) {
                assets.push(AssetStatus {
                    kind: AssetKind::Background,
                    key: emotion.to_string(),
                    present: path.is_file(),
                    path,
                });
            }
        }
        for id in config.sfx.keys() {
            if let Some(path) = config.sfx_path(id) {
                assets.push(AssetStatus {
                    kind: AssetKind::Sfx,
                    key: id.clone(),
                    present: path.is_file(),
                    path,
                });
            }
        }
        Self {
            assets,
            background_dir_files: audio_files_in(&config.bgm_dir_path()).len(),
        }
    }

    /// True when at least one real asset can be loaded.
    pub fn any_available(&self) -> bool {
        self.background_dir_files > 0 || self.assets.iter().any(|a| a.present)
    }

    pub fn missing(&self) -> impl Iterator<Item = &AssetStatus> {
        self.assets.iter().filter(|a| !a.present)
    }
}
