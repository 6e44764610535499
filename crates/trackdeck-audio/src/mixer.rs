//! Audio mixer: sums track players into one interleaved output block.

use crate::player::TrackPlayer;

/// Per-track gain stage.
#[derive(Debug, Clone, PartialEq)]
pub struct MixerChannel {
    /// Linear gain (1.0 = unity).
    pub volume: f32,
    /// Pan (-1.0 = full left, 0.0 = center, 1.0 = full right).
    pub pan: f32,
}

impl Default for MixerChannel {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
        }
    }
}

impl MixerChannel {
    /// Left/right gain from volume and pan.
    ///
    /// Balance law: both sides are at unity when centered and panning
    /// attenuates only the far side.
    pub fn stereo_gain(&self) -> (f32, f32) {
        let pan = self.pan.clamp(-1.0, 1.0);
        let left = self.volume * (1.0 - pan).min(1.0);
        let right = self.volume * (1.0 + pan).min(1.0);
        (left, right)
    }

    /// Gain applied to output channel `channel` of a `channels`-wide mix.
    /// Pan only applies to stereo output.
    fn gain_for(&self, channel: usize, channels: usize) -> f32 {
        if channels != 2 {
            return self.volume;
        }
        let (left, right) = self.stereo_gain();
        if channel == 0 {
            left
        } else {
            right
        }
    }
}

/// Mixes any number of players into interleaved output.
#[derive(Debug)]
pub struct Mixer {
    /// Master volume.
    pub master_volume: f32,
    /// Master limiter enabled.
    pub limiter_enabled: bool,
    /// Limiter threshold in linear amplitude.
    pub limiter_threshold: f32,
    /// Planar scratch, one plane per output channel.
    scratch: Vec<Vec<f32>>,
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

impl Mixer {
    pub fn new() -> Self {
        Self {
            master_volume: 1.0,
            limiter_enabled: false,
            limiter_threshold: 0.95,
            scratch: Vec::new(),
        }
    }

    /// Pre-size the scratch planes so mixing `max_frames` never allocates.
    pub fn prepare(&mut self, channels: usize, max_frames: usize) {
        self.scratch.resize_with(channels, Vec::new);
        for plane in &mut self.scratch {
            if plane.len() < max_frames {
                plane.resize(max_frames, 0.0);
            }
        }
    }

    /// Render every player into `out` (interleaved, `channels` wide),
    /// overwriting its previous contents.
    pub fn mix<'a>(
        &mut self,
        players: impl IntoIterator<Item = &'a mut TrackPlayer>,
        sample_rate: u32,
        channels: usize,
        out: &mut [f32],
    ) {
        out.fill(0.0);
        if channels == 0 {
            return;
        }
        let frames = out.len() / channels;
        self.prepare(channels, frames);

        for player in players {
            for plane in &mut self.scratch[..channels] {
                plane[..frames].fill(0.0);
            }
            player.render(sample_rate, frames, &mut self.scratch[..channels]);

            let channel = player.channel();
            for (c, plane) in self.scratch[..channels].iter().enumerate() {
                let gain = channel.gain_for(c, channels);
                for (frame, &sample) in plane[..frames].iter().enumerate() {
                    out[frame * channels + c] += sample * gain;
                }
            }
        }

        if self.master_volume != 1.0 {
            for s in out.iter_mut() {
                *s *= self.master_volume;
            }
        }

        // Simple hard clamp
        if self.limiter_enabled {
            let threshold = self.limiter_threshold;
            for s in out.iter_mut() {
                *s = s.clamp(-threshold, threshold);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::ScheduledBuffer;
    use std::sync::Arc;
    use trackdeck_core::PcmBuffer;
    use uuid::Uuid;

    fn playing(value: f32, frames: usize) -> TrackPlayer {
        let mut player = TrackPlayer::new();
        player.schedule(ScheduledBuffer {
            clip_id: Uuid::new_v4(),
            offset_frames: 0,
            buffer: Arc::new(PcmBuffer::from_planar_f32(
                1000,
                vec![vec![value; frames], vec![value; frames]],
            )),
        });
        player.play();
        player
    }

    #[test]
    fn test_stereo_gain_center() {
        let ch = MixerChannel::default();
        assert_eq!(ch.stereo_gain(), (1.0, 1.0));
    }

    #[test]
    fn test_stereo_gain_pan_left() {
        let ch = MixerChannel {
            pan: -1.0,
            ..Default::default()
        };
        let (l, r) = ch.stereo_gain();
        assert_eq!(l, 1.0);
        assert_eq!(r, 0.0);

        let half = MixerChannel {
            volume: 0.5,
            pan: 0.5,
        };
        assert_eq!(half.stereo_gain(), (0.25, 0.5));
    }

    #[test]
    fn test_mixer_sums_players() {
        let mut mixer = Mixer::new();
        let mut a = playing(0.5, 4);
        let mut b = playing(0.25, 4);

        let mut out = vec![0.0f32; 8];
        mixer.mix([&mut a, &mut b], 1000, 2, &mut out);
        assert!(out.iter().all(|&s| (s - 0.75).abs() < 1e-6));
    }

    #[test]
    fn test_mixer_applies_channel_gain() {
        let mut mixer = Mixer::new();
        let mut a = playing(1.0, 4);
        a.channel_mut().pan = 1.0;

        let mut out = vec![0.0f32; 8];
        mixer.mix([&mut a], 1000, 2, &mut out);
        for frame in out.chunks(2) {
            assert_eq!(frame, &[0.0, 1.0]);
        }
    }

    #[test]
    fn test_mixer_limiter() {
        let mut mixer = Mixer::new();
        mixer.limiter_enabled = true;
        mixer.limiter_threshold = 0.8;
        let mut loud = playing(2.0, 4);

        let mut out = vec![0.0f32; 8];
        mixer.mix([&mut loud], 1000, 2, &mut out);
        for s in &out {
            assert!(s.abs() <= 0.8);
        }
    }

    #[test]
    fn test_mixer_overwrites_output() {
        let mut mixer = Mixer::new();
        let mut out = vec![9.0f32; 8];
        mixer.mix(std::iter::empty(), 1000, 2, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
