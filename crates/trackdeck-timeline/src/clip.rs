//! Clips: decoded audio placed on a track.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use trackdeck_audio::Envelope;
use trackdeck_core::{PcmBuffer, TimeRange};
use uuid::Uuid;

use crate::serialization::ClipRecord;

/// A placed audio region.
///
/// The buffer is decoded once and never modified; duration is always read
/// from it. Clips are deliberately not `Clone`: every clip owns its own
/// decoded buffer.
#[derive(Debug)]
pub struct Clip {
    /// Unique clip ID
    pub id: Uuid,
    /// Groups clips decoded from the same import
    pub file_id: Uuid,
    /// Owning track
    pub track_id: Uuid,
    /// Source the buffer was decoded from
    pub locator: PathBuf,
    /// Display name (the source file name)
    pub name: String,
    /// Timeline start in seconds
    pub start_time: f64,
    /// UI selection flag
    pub selected: bool,
    buffer: Arc<PcmBuffer>,
    envelope: Envelope,
}

impl Clip {
    /// Create a clip from a freshly decoded buffer. Computes the envelope.
    pub fn new(
        locator: impl Into<PathBuf>,
        buffer: PcmBuffer,
        track_id: Uuid,
        start_time: f64,
        envelope_compression: usize,
    ) -> Self {
        let locator = locator.into();
        let envelope = Envelope::compute(&buffer, envelope_compression);
        Self {
            id: Uuid::new_v4(),
            file_id: Uuid::new_v4(),
            track_id,
            name: display_name(&locator),
            locator,
            start_time: start_time.max(0.0),
            selected: false,
            buffer: Arc::new(buffer),
            envelope,
        }
    }

    /// Rebuild a clip from its persisted record and a re-decoded buffer.
    pub fn from_record(record: &ClipRecord, buffer: PcmBuffer, envelope_compression: usize) -> Self {
        let mut clip = Self::new(
            record.locator.clone(),
            buffer,
            record.track_id,
            record.start_time,
            envelope_compression,
        );
        clip.id = record.id;
        clip
    }

    /// The decoded audio.
    pub fn buffer(&self) -> &Arc<PcmBuffer> {
        &self.buffer
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate()
    }

    /// Duration in seconds, derived from the buffer.
    pub fn duration(&self) -> f64 {
        self.buffer.duration()
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration()
    }

    pub fn time_range(&self) -> TimeRange {
        TimeRange::from_start_duration(self.start_time, self.duration())
    }

    /// Normalized level in [0, 1] at `at` seconds after the clip start.
    pub fn power(&self, at: f64) -> f32 {
        self.envelope.power_at(at)
    }

    /// Persisted form: identity, placement and source, never samples.
    pub fn record(&self) -> ClipRecord {
        ClipRecord {
            id: self.id,
            track_id: self.track_id,
            locator: self.locator.clone(),
            start_time: self.start_time,
        }
    }
}

fn display_name(locator: &Path) -> String {
    locator
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| locator.to_string_lossy().into_owned())
}
