//! Amplitude envelopes for level queries and waveform display.
//!
//! An envelope is computed once when a clip is loaded and never on the
//! render path.

use trackdeck_core::defaults::ENVELOPE_FLOOR_DB;
use trackdeck_core::PcmBuffer;

/// Downsampled absolute-amplitude summary of a buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Source frames averaged into each value.
    pub compression: usize,
    /// One mean absolute amplitude per window.
    pub values: Vec<f32>,
    /// Duration of the source buffer in seconds.
    pub duration: f64,
}

impl Envelope {
    /// Compute the envelope of `buffer`'s first channel.
    pub fn compute(buffer: &PcmBuffer, compression: usize) -> Self {
        Self {
            compression: compression.max(1),
            values: buffer.compressed_envelope(compression),
            duration: buffer.duration(),
        }
    }

    /// Number of envelope values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw envelope value covering `time` seconds after the buffer start.
    pub fn value_at(&self, time: f64) -> Option<f32> {
        if self.values.is_empty() || self.duration <= 0.0 || time < 0.0 {
            return None;
        }
        let rate = self.values.len() as f64 / self.duration;
        self.values.get((time * rate) as usize).copied()
    }

    /// Normalized power in [0, 1] at `time` seconds after the buffer start.
    ///
    /// Times outside the envelope read as silence.
    pub fn power_at(&self, time: f64) -> f32 {
        self.value_at(time)
            .map(|v| scaled_power(20.0 * v.log10()))
            .unwrap_or(0.0)
    }

    /// RMS of the envelope values in `[start, end)`.
    pub fn rms_range(&self, start: usize, end: usize) -> f32 {
        let start = start.min(self.values.len());
        let end = end.min(self.values.len());
        if start >= end {
            return 0.0;
        }

        let sum: f64 = self.values[start..end]
            .iter()
            .map(|&v| (v as f64) * (v as f64))
            .sum();
        (sum / (end - start) as f64).sqrt() as f32
    }
}

/// Map a decibel value onto [0, 1] against an -80 dB floor.
pub fn scaled_power(db: f32) -> f32 {
    if !db.is_finite() || db < ENVELOPE_FLOOR_DB {
        return 0.0;
    }
    if db >= 1.0 {
        return 1.0;
    }
    let floor = ENVELOPE_FLOOR_DB.abs();
    (floor - db.abs()) / floor
}
