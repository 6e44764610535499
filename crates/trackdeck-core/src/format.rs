//! Audio format description shared by buffers, players and sinks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How individual samples are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SampleKind {
    /// 32-bit float in [-1.0, 1.0]
    #[default]
    F32,
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer
    I32,
}

impl SampleKind {
    /// Bytes used by one sample of this kind.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::I16 => 2,
        }
    }

    /// Bit depth of this representation.
    pub fn bits(self) -> u16 {
        (self.bytes_per_sample() * 8) as u16
    }
}

/// Channel count, sample rate and sample representation of planar PCM data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Frames per second
    pub sample_rate: u32,
    /// Number of channels (planes)
    pub channels: u16,
    /// Sample representation
    pub sample_kind: SampleKind,
}

impl AudioFormat {
    /// Create a new format.
    #[inline]
    pub const fn new(sample_rate: u32, channels: u16, sample_kind: SampleKind) -> Self {
        Self {
            sample_rate,
            channels,
            sample_kind,
        }
    }

    /// Float format, the representation used by the mix stage.
    #[inline]
    pub const fn float(sample_rate: u32, channels: u16) -> Self {
        Self::new(sample_rate, channels, SampleKind::F32)
    }

    /// Bytes needed for one frame (one sample per channel).
    pub fn bytes_per_frame(self) -> usize {
        self.channels as usize * self.sample_kind.bytes_per_sample()
    }

    /// Duration in seconds of `frames` frames at this rate.
    pub fn frames_to_seconds(self, frames: u64) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        frames as f64 / self.sample_rate as f64
    }

    /// Common mix formats
    pub const STEREO_44_1K: Self = Self::float(44_100, 2);
    pub const STEREO_48K: Self = Self::float(48_000, 2);
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::STEREO_48K
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {:?}",
            self.sample_rate, self.channels, self.sample_kind
        )
    }
}
