//! Timeline time helpers.
//!
//! Timeline positions are plain seconds (`f64`); conversions to frame
//! positions happen at the buffer's own sample rate, so durations derived
//! from a buffer never drift from the buffer itself.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Convert seconds to a frame index, truncating toward zero.
///
/// Negative times map to frame zero.
#[inline]
pub fn seconds_to_frames(seconds: f64, sample_rate: u32) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * sample_rate as f64) as u64
}

/// Convert seconds to the nearest frame count.
#[inline]
pub fn seconds_to_frames_rounded(seconds: f64, sample_rate: u32) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * sample_rate as f64).round() as u64
}

/// Convert a frame count to seconds.
#[inline]
pub fn frames_to_seconds(frames: u64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    frames as f64 / sample_rate as f64
}

/// A half-open time range `[start, end)` in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start time (inclusive)
    pub start: f64,
    /// End time (exclusive)
    pub end: f64,
}

impl TimeRange {
    /// Create a new time range.
    #[inline]
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Create a time range from a start and a duration.
    #[inline]
    pub fn from_start_duration(start: f64, duration: f64) -> Self {
        Self {
            start,
            end: start + duration,
        }
    }

    /// Length of the range.
    #[inline]
    pub fn duration(self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Check if a time is within this range.
    #[inline]
    pub fn contains(self, time: f64) -> bool {
        time >= self.start && time < self.end
    }

    /// Check if two ranges overlap.
    pub fn overlaps(self, other: Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Compute the intersection of two ranges, if any.
    pub fn intersection(self, other: Self) -> Option<Self> {
        if !self.overlaps(other) {
            return None;
        }
        Some(Self::new(
            self.start.max(other.start),
            self.end.min(other.end),
        ))
    }

    /// Shift the range so it starts at `start`, keeping its duration.
    pub fn moved_to(self, start: f64) -> Self {
        Self::from_start_duration(start, self.duration())
    }

    /// Empty range starting at zero.
    pub const EMPTY: Self = Self {
        start: 0.0,
        end: 0.0,
    };
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s..{:.3}s", self.start, self.end)
    }
}

/// Transport display formatting for seconds.
pub trait Timecode {
    /// `m:ss`
    fn mmss(self) -> String;
    /// `m:ss,cc` (hundredths)
    fn mmssms(self) -> String;
    /// `hh:mm:ss.mmm`
    fn hhmmssms(self) -> String;
}

impl Timecode for f64 {
    fn mmss(self) -> String {
        let total = self.max(0.0) as u64;
        format!("{}:{:02}", total / 60, total % 60)
    }

    fn mmssms(self) -> String {
        let secs = self.max(0.0);
        let total = secs as u64;
        let ms = (secs.fract() * 1000.0) as u64;
        format!("{}:{:02},{:02}", total / 60, total % 60, ms / 10)
    }

    fn hhmmssms(self) -> String {
        let secs = self.max(0.0);
        let total = secs as u64;
        let ms = (secs.fract() * 1000.0) as u64;
        format!(
            "{:02}:{:02}:{:02}.{:03}",
            total / 3600,
            (total / 60) % 60,
            total % 60,
            ms
        )
    }
}
