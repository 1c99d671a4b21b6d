//! Taleweave core: mixes narrated story segments with emotion-matched
//! background music and keyword-triggered sound effects.

pub mod assets;
pub mod audio;
pub mod config;
pub mod error;
pub mod fallback;
pub mod mix;
pub mod pipeline;
pub mod types;

#[cfg(test)]
mod testutil;

pub use config::MixConfig;
pub use error::{MixError, Result};
pub use pipeline::{audio_info, mix_audio, mix_chapters, preview_mix, AudioInfo, MixReport};
