//! Audio decoders.
//!
//! A decoder turns a source locator into a full `PcmBuffer` at the file's
//! native format. The timeline never parses containers itself.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use trackdeck_core::{PcmBuffer, Result, TrackdeckError};

/// Decodes a source locator into PCM.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, locator: &Path) -> Result<PcmBuffer>;
}

/// WAV decoder backed by hound.
///
/// 8- and 16-bit files decode to 16-bit planes, 24- and 32-bit integer
/// files to 32-bit planes (left-aligned), float files to float planes.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl WavDecoder {
    pub fn new() -> Self {
        Self
    }
}

fn decode_error(locator: &Path, e: impl std::fmt::Display) -> TrackdeckError {
    TrackdeckError::Decoder(format!("{}: {}", locator.display(), e))
}

impl AudioDecoder for WavDecoder {
    fn decode(&self, locator: &Path) -> Result<PcmBuffer> {
        info!("Decoding audio file: {}", locator.display());

        let mut reader = hound::WavReader::open(locator).map_err(|e| decode_error(locator, e))?;
        let spec = reader.spec();
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(decode_error(locator, "file declares no channels or sample rate"));
        }

        let buffer = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Float, 32) => {
                let samples = reader
                    .samples::<f32>()
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| decode_error(locator, e))?;
                PcmBuffer::from_interleaved_f32(spec.sample_rate, spec.channels, &samples)
            }
            (hound::SampleFormat::Int, bits @ (8 | 16)) => {
                let shift = 16 - bits;
                let samples = reader
                    .samples::<i16>()
                    .map(|s| s.map(|x| x << shift))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| decode_error(locator, e))?;
                PcmBuffer::from_interleaved_i16(spec.sample_rate, spec.channels, &samples)
            }
            (hound::SampleFormat::Int, bits @ (24 | 32)) => {
                let shift = 32 - bits;
                let samples = reader
                    .samples::<i32>()
                    .map(|s| s.map(|x| x << shift))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| decode_error(locator, e))?;
                PcmBuffer::from_interleaved_i32(spec.sample_rate, spec.channels, &samples)
            }
            (format, bits) => {
                return Err(decode_error(
                    locator,
                    format!("unsupported sample format {:?} at {} bits", format, bits),
                ))
            }
        };

        debug!(
            "Decoded {} frames ({}) from {}",
            buffer.frame_length(),
            buffer.format(),
            locator.display()
        );
        Ok(buffer)
    }
}

/// Decoder serving pre-registered buffers. Unknown locators fail the way
/// an unreadable file would.
#[derive(Debug, Default)]
pub struct MemoryDecoder {
    sources: RwLock<HashMap<PathBuf, PcmBuffer>>,
}

impl MemoryDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `buffer` under `locator`, replacing any previous entry.
    pub fn insert(&self, locator: impl Into<PathBuf>, buffer: PcmBuffer) {
        self.sources.write().insert(locator.into(), buffer);
    }

    pub fn remove(&self, locator: &Path) {
        self.sources.write().remove(locator);
    }
}

impl AudioDecoder for MemoryDecoder {
    fn decode(&self, locator: &Path) -> Result<PcmBuffer> {
        self.sources
            .read()
            .get(locator)
            .cloned()
            .ok_or_else(|| decode_error(locator, "no such source"))
    }
}
