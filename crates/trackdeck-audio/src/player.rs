//! Per-track buffer players.
//!
//! A player holds the buffers a track has scheduled for the current
//! playback session and renders them relative to the moment playback
//! started. Players never decide what to schedule; the timeline drives
//! every transition.

use parking_lot::Mutex;
use std::sync::Arc;
use trackdeck_core::PcmBuffer;
use uuid::Uuid;

use crate::mixer::MixerChannel;

/// Player transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    /// Nothing queued.
    #[default]
    Idle,
    /// Buffers queued, not yet started.
    Scheduled,
    /// Rendering queued buffers.
    Playing,
    /// Halted; the queue has been flushed.
    Stopped,
}

/// A buffer queued on a player.
#[derive(Debug, Clone)]
pub struct ScheduledBuffer {
    /// Clip the buffer was cut from.
    pub clip_id: Uuid,
    /// Frames, at the buffer's own sample rate, between the start of
    /// playback and the buffer's first frame.
    pub offset_frames: u64,
    /// Audio to play.
    pub buffer: Arc<PcmBuffer>,
}

impl ScheduledBuffer {
    /// Span of this buffer in output frames: `(start, length)`.
    fn output_span(&self, output_rate: u32) -> (u64, u64) {
        let source_rate = self.buffer.sample_rate();
        let frames = self.buffer.frame_length() as u64;
        if source_rate == output_rate || source_rate == 0 {
            return (self.offset_frames, frames);
        }
        let ratio = output_rate as f64 / source_rate as f64;
        (
            (self.offset_frames as f64 * ratio).round() as u64,
            (frames as f64 * ratio).ceil() as u64,
        )
    }
}

/// Player shared between its owning track and the render domain.
pub type SharedPlayer = Arc<Mutex<TrackPlayer>>;

/// Plays the buffers scheduled by one track.
#[derive(Debug, Default)]
pub struct TrackPlayer {
    state: PlayerState,
    queue: Vec<ScheduledBuffer>,
    channel: MixerChannel,
    /// Output frames rendered since `play()`.
    position: u64,
}

impl TrackPlayer {
    /// Create an idle player.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an idle player wrapped for sharing with the render domain.
    pub fn shared() -> SharedPlayer {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// Buffers queued for the current session.
    pub fn scheduled(&self) -> &[ScheduledBuffer] {
        &self.queue
    }

    /// Gain and pan applied when this player is mixed.
    pub fn channel(&self) -> &MixerChannel {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut MixerChannel {
        &mut self.channel
    }

    /// Output frames rendered since playback started.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Queue a buffer. Buffers may be queued before or during playback.
    pub fn schedule(&mut self, scheduled: ScheduledBuffer) {
        self.queue.push(scheduled);
        if matches!(self.state, PlayerState::Idle | PlayerState::Stopped) {
            self.state = PlayerState::Scheduled;
        }
    }

    /// Start rendering queued buffers from position zero.
    pub fn play(&mut self) {
        if self.state != PlayerState::Playing {
            self.position = 0;
            self.state = PlayerState::Playing;
        }
    }

    /// Halt playback and flush the queue.
    pub fn stop(&mut self) {
        self.queue.clear();
        self.position = 0;
        self.state = PlayerState::Stopped;
    }

    /// True once every queued buffer has been rendered in full.
    pub fn is_drained(&self, output_rate: u32) -> bool {
        self.queue.iter().all(|s| {
            let (start, len) = s.output_span(output_rate);
            start + len <= self.position
        })
    }

    /// Add this player's next `frames` output frames into `planes`
    /// (one slice per output channel). Advances the play position.
    ///
    /// Does nothing unless the player is playing.
    pub fn render(&mut self, output_rate: u32, frames: usize, planes: &mut [Vec<f32>]) {
        if self.state != PlayerState::Playing || frames == 0 {
            return;
        }

        let window_start = self.position;
        let window_end = window_start + frames as u64;

        for scheduled in &self.queue {
            let (start, len) = scheduled.output_span(output_rate);
            let end = start + len;
            if end <= window_start || start >= window_end {
                continue;
            }

            let from = start.max(window_start);
            let to = end.min(window_end);
            let buffer = &scheduled.buffer;
            let source_channels = buffer.channel_count();
            if source_channels == 0 {
                continue;
            }
            let step = buffer.sample_rate() as f64 / output_rate as f64;
            let resampling = buffer.sample_rate() != output_rate;
            let last = buffer.frame_length().saturating_sub(1);

            for (out_channel, plane) in planes.iter_mut().enumerate() {
                let src_channel = out_channel.min(source_channels - 1);
                for t in from..to {
                    let rel = t - start;
                    let sample = if resampling {
                        let pos = rel as f64 * step;
                        let i = (pos as usize).min(last);
                        let j = (i + 1).min(last);
                        let frac = (pos - i as f64) as f32;
                        let a = buffer.sample_f32(src_channel, i);
                        let b = buffer.sample_f32(src_channel, j);
                        a + (b - a) * frac
                    } else {
                        buffer.sample_f32(src_channel, rel as usize)
                    };
                    plane[(t - window_start) as usize] += sample;
                }
            }
        }

        self.position = window_end;
    }
}
