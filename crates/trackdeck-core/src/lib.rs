//! Trackdeck Core - Foundation types for the audio timeline editor
//!
//! This crate provides the fundamental types used throughout Trackdeck:
//! - PCM buffers and the copy/extract primitives behind partial-clip playback
//! - Audio format descriptions
//! - Time conversion and display helpers
//! - Engine configuration

pub mod buffer;
pub mod config;
pub mod error;
pub mod format;
pub mod time;

pub use buffer::{ChannelPlane, PcmBuffer};
pub use config::EngineConfig;
pub use error::{Result, TrackdeckError};
pub use format::{AudioFormat, SampleKind};
pub use time::{frames_to_seconds, seconds_to_frames, seconds_to_frames_rounded, TimeRange, Timecode};

/// Engine-wide defaults shared by the timeline and the renderers.
pub mod defaults {
    /// Seconds of scrub headroom after the last clip.
    pub const TRAILING_MARGIN: f64 = 60.0;

    /// Frames rendered per offline render call.
    pub const MAX_RENDER_FRAMES: usize = 4096;

    /// Source frames per envelope value.
    pub const ENVELOPE_COMPRESSION: usize = 1000;

    /// Envelope floor in decibels; quieter values read as silence.
    pub const ENVELOPE_FLOOR_DB: f32 = -80.0;
}
