//! Cached asset lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::source::{AssetAvailability, AssetSource, FileAssetSource, SilentAssetSource, ANY_BACKGROUND_KEY};
use super::{AssetKind, AudioAsset};
use crate::config::MixConfig;
use crate::error::AssetError;

type CacheKey = (AssetKind, String);
type CacheEntry = Result<Arc<AudioAsset>, AssetError>;

/// Resolves logical keys to decoded audio, loading each key at most once.
///
/// Failures are cached alongside successes, so a broken file is read once
/// per resolver. The cache only grows until [`clear_cache`](Self::clear_cache).
pub struct AssetResolver {
    source: Box<dyn AssetSource>,
    cache: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl AssetResolver {
    pub fn new(source: Box<dyn AssetSource>) -> Self {
        Self {
            source,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// File-backed resolver when any configured asset exists, silent otherwise.
    pub fn from_config(config: &MixConfig) -> Self {
        let availability = AssetAvailability::probe(config);
        let missing = availability.missing().count();
        if availability.any_available() {
            log::info!(
                "Using asset files under {} ({} of {} mapped assets missing)",
                config.asset_root.display(),
                missing,
                availability.assets.len()
            );
            Self::new(Box::new(FileAssetSource::new(config)))
        } else {
            log::warn!(
                "No audio assets found under {}; background and effects will be silent",
                config.asset_root.display()
            );
            Self::new(Box::new(SilentAssetSource::new(config.encoding.sample_rate)))
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn resolve(&self, kind: AssetKind, key: &str) -> Result<Arc<AudioAsset>, AssetError> {
        self.cached_or_load((kind, key.to_string()), || self.source.load(kind, key))
    }

    /// First decodable file in the background directory.
    pub fn resolve_any_background(&self) -> Result<Arc<AudioAsset>, AssetError> {
        self.cached_or_load(
            (AssetKind::Background, ANY_BACKGROUND_KEY.to_string()),
            || self.source.load_any_background(),
        )
    }

    /// Warm the cache for `keys` on scoped worker threads.
    pub fn prefetch(&self, keys: &[(AssetKind, String)]) {
        let pending: Vec<&(AssetKind, String)> = {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            keys.iter().filter(|k| !cache.contains_key(*k)).collect()
        };
        if pending.is_empty() {
            return;
        }
        log::debug!("Prefetching {} assets", pending.len());
        std::thread::scope(|s| {
            for (kind, key) in pending {
                s.spawn(move || {
                    let _ = self.resolve(*kind, key);
                });
            }
        });
    }

    /// Number of cached entries, failures included.
    pub fn cached_count(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn clear_cache(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let n = cache.len();
        cache.clear();
        log::debug!("Cleared {} cached assets", n);
    }

    fn cached_or_load<F>(&self, cache_key: CacheKey, load: F) -> CacheEntry
    where
        F: FnOnce() -> Result<AudioAsset, AssetError>,
    {
        if let Some(entry) = self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(&cache_key) {
            return entry.clone();
        }

        // Decode without holding the lock; the first insert wins.
        let loaded = load().map(Arc::new);
        if let Err(e) = &loaded {
            log::warn!("{}", e);
        }
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.entry(cache_key).or_insert(loaded).clone()
    }
}
