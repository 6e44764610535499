//! Tracks and the per-track scheduling pass.

use std::sync::Arc;
use tracing::debug;
use trackdeck_audio::{ScheduledBuffer, SharedPlayer, TrackPlayer};
use trackdeck_core::{seconds_to_frames, seconds_to_frames_rounded, TimeRange};
use uuid::Uuid;

use crate::clip::Clip;

/// One scheduling decision for one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulePlan {
    pub clip_id: Uuid,
    /// Frames (at the clip's rate) between playback start and the first
    /// scheduled frame.
    pub offset_frames: u64,
    /// Seconds into the clip where the scheduled audio begins.
    pub source_start: f64,
    /// Frames that will play.
    pub frames: usize,
}

impl SchedulePlan {
    /// True when the clip is already underway and only its tail plays.
    pub fn is_partial(&self) -> bool {
        self.source_start > 0.0
    }
}

/// A track containing clips.
#[derive(Debug)]
pub struct Track {
    /// Unique track ID
    pub id: Uuid,
    /// Track name
    pub name: String,
    /// Explicit mute flag
    pub muted: bool,
    pub solo: bool,
    /// Linear gain
    pub volume: f32,
    /// -1.0 (left) to 1.0 (right)
    pub pan: f32,
    clips: Vec<Clip>,
    player: SharedPlayer,
}

impl Track {
    /// Create an empty track.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), name)
    }

    pub fn with_id(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            muted: false,
            solo: false,
            volume: 1.0,
            pan: 0.0,
            clips: Vec::new(),
            player: TrackPlayer::shared(),
        }
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn clips_mut(&mut self) -> &mut [Clip] {
        &mut self.clips
    }

    pub fn clip(&self, id: Uuid) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == id)
    }

    pub fn clip_mut(&mut self, id: Uuid) -> Option<&mut Clip> {
        self.clips.iter_mut().find(|c| c.id == id)
    }

    /// Append a clip, taking ownership of its track reference.
    pub fn add_clip(&mut self, mut clip: Clip) {
        clip.track_id = self.id;
        self.clips.push(clip);
    }

    /// Remove a clip by ID.
    pub fn remove_clip(&mut self, id: Uuid) -> Option<Clip> {
        let index = self.clips.iter().position(|c| c.id == id)?;
        Some(self.clips.remove(index))
    }

    /// End of the last clip, or zero for an empty track.
    pub fn end_time(&self) -> f64 {
        self.clips.iter().map(Clip::end_time).fold(0.0, f64::max)
    }

    /// Clips other than `except` whose span intersects `range`.
    pub fn overlapping(&self, range: TimeRange, except: Uuid) -> impl Iterator<Item = &Clip> {
        self.clips
            .iter()
            .filter(move |c| c.id != except && c.time_range().overlaps(range))
    }

    /// Effective mute: while any track is soloed only soloed tracks play,
    /// otherwise the explicit flag decides.
    pub fn is_muted(&self, any_solo: bool) -> bool {
        if any_solo {
            !self.solo
        } else {
            self.muted
        }
    }

    /// The player fed by [`schedule`](Self::schedule).
    pub fn player(&self) -> &SharedPlayer {
        &self.player
    }

    /// Decide what each clip contributes when playback starts at
    /// `current_time`. Pure: repeated calls agree.
    pub fn plan(&self, current_time: f64) -> Vec<SchedulePlan> {
        let mut plans = Vec::with_capacity(self.clips.len());
        for clip in &self.clips {
            let start = clip.start_time;
            let end = clip.end_time();
            let rate = clip.sample_rate();
            let frames = clip.buffer().frame_length();

            if current_time > end {
                continue;
            }
            if current_time <= start {
                plans.push(SchedulePlan {
                    clip_id: clip.id,
                    offset_frames: seconds_to_frames_rounded(start - current_time, rate),
                    source_start: 0.0,
                    frames,
                });
            } else if current_time < end {
                let source_start = current_time - start;
                let skipped = seconds_to_frames(source_start, rate) as usize;
                plans.push(SchedulePlan {
                    clip_id: clip.id,
                    offset_frames: 0,
                    source_start,
                    frames: frames.saturating_sub(skipped),
                });
            }
        }
        plans
    }

    /// Queue this track's clips on its player for playback starting at
    /// `current_time`. Muted tracks queue nothing. Returns the number of
    /// buffers queued.
    pub fn schedule(&self, current_time: f64, any_solo: bool) -> usize {
        if self.is_muted(any_solo) {
            debug!("Track '{}' muted, not scheduled", self.name);
            return 0;
        }

        let mut player = self.player.lock();
        {
            let channel = player.channel_mut();
            channel.volume = self.volume;
            channel.pan = self.pan;
        }

        let mut queued = 0;
        for plan in self.plan(current_time) {
            let Some(clip) = self.clip(plan.clip_id) else {
                continue;
            };
            let buffer = if plan.is_partial() {
                // An end time of zero extracts through the end of the clip.
                match clip.buffer().extract_range(plan.source_start, 0.0) {
                    Some(tail) => Arc::new(tail),
                    None => {
                        debug!("Clip '{}' has no audio after {:.3}s", clip.name, plan.source_start);
                        continue;
                    }
                }
            } else {
                Arc::clone(clip.buffer())
            };
            player.schedule(ScheduledBuffer {
                clip_id: clip.id,
                offset_frames: plan.offset_frames,
                buffer,
            });
            queued += 1;
        }
        debug!("Track '{}' scheduled {} buffers at {:.3}s", self.name, queued, current_time);
        queued
    }
}
