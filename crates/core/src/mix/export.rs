//! Encoding, output validation and atomic write of a rendered track.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::audio::io::{encode_wav, wav_info_from_bytes};
use crate::config::EncodingParams;
use crate::error::{ExportError, MixError, Result};

use super::render::{AudioMixer, RenderedTrack};

/// Turns mono samples into the bytes of an output file.
pub trait TrackEncoder: Send + Sync {
    fn name(&self) -> &str;

    fn encode(&self, samples: &[f64], params: &EncodingParams) -> std::result::Result<Vec<u8>, ExportError>;
}

/// PCM WAV through hound.
pub struct WavEncoder;

impl TrackEncoder for WavEncoder {
    fn name(&self) -> &str {
        "wav"
    }

    fn encode(&self, samples: &[f64], params: &EncodingParams) -> std::result::Result<Vec<u8>, ExportError> {
        Ok(encode_wav(samples, params)?)
    }
}

/// A successfully exported file.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedTrack {
    pub path: PathBuf,
    /// Encoded file size.
    pub bytes: u64,
    pub duration_s: f64,
    pub frames: u64,
    /// Hex SHA-256 of the encoded bytes.
    pub sha256: String,
}

struct Encoded {
    data: Vec<u8>,
    duration_s: f64,
    frames: u64,
}

impl AudioMixer<'_> {
    /// Encode `track`, validate the result and write it to `output`.
    ///
    /// A failed attempt is retried once. Nothing is written unless an
    /// attempt passes validation.
    pub fn export(&self, track: &RenderedTrack, output: &Path) -> Result<MixedTrack> {
        let samples: Arc<[f64]> = Arc::from(track.samples.as_slice());

        let encoded = match self.encode_checked(&samples) {
            Ok(e) => e,
            Err(first) => {
                log::warn!("Export attempt failed ({}), retrying once", first);
                self.encode_checked(&samples).map_err(MixError::Failure)?
            }
        };

        write_atomic(output, &encoded.data)?;

        let mixed = MixedTrack {
            path: output.to_path_buf(),
            bytes: encoded.data.len() as u64,
            duration_s: encoded.duration_s,
            frames: encoded.frames,
            sha256: format!("{:x}", Sha256::digest(&encoded.data)),
        };
        log::info!(
            "Wrote {} ({:.2}s, {} bytes, {} kbps)",
            output.display(),
            mixed.duration_s,
            mixed.bytes,
            self.config.encoding.bitrate_kbps()
        );
        Ok(mixed)
    }

    fn encode_checked(&self, samples: &Arc<[f64]>) -> std::result::Result<Encoded, ExportError> {
        let data = self.encode_with_timeout(samples.clone(), self.config.export_timeout())?;

        let min_bytes = self.config.min_output_bytes;
        if (data.len() as u64) <= min_bytes {
            return Err(ExportError::TooSmall {
                actual: data.len() as u64,
                min: min_bytes,
            });
        }

        let info = wav_info_from_bytes(&data)?;
        let duration_s = info.duration_s();
        if duration_s <= self.config.min_output_duration_s {
            return Err(ExportError::TooShort {
                actual_s: duration_s,
                min_s: self.config.min_output_duration_s,
            });
        }

        Ok(Encoded {
            data,
            duration_s,
            frames: info.frames as u64,
        })
    }

    /// Run the encoder on a worker thread, giving up after `timeout`.
    ///
    /// A worker that misses the deadline is left to finish on its own; its
    /// result is dropped.
    fn encode_with_timeout(
        &self,
        samples: Arc<[f64]>,
        timeout: Duration,
    ) -> std::result::Result<Vec<u8>, ExportError> {
        let (tx, rx) = mpsc::channel();
        let encoder = self.encoder.clone();
        let params = self.config.encoding;

        std::thread::spawn(move || {
            let _ = tx.send(encoder.encode(&samples, &params));
        });

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(ExportError::Timeout(timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ExportError::Encode(format!(
                "{} encoder stopped without a result",
                self.encoder.name()
            ))),
        }
    }
}

/// Write via a temp file in the destination directory, then rename.
fn write_atomic(target: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}
