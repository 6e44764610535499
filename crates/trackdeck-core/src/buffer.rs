//! Planar PCM buffers with a fixed capacity and a mutable fill length.
//!
//! These are the primitives the timeline uses to cut sub-regions out of an
//! immutable decoded source: appending copies, suffix/prefix extraction and
//! time-range extraction. Copies only ever move the feasible overlap between
//! the requested source range and the remaining capacity.

use smallvec::SmallVec;

use crate::error::{Result, TrackdeckError};
use crate::format::{AudioFormat, SampleKind};

/// Sample storage for one channel, always `capacity` samples long.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelPlane {
    F32(Vec<f32>),
    I16(Vec<i16>),
    I32(Vec<i32>),
}

impl ChannelPlane {
    fn zeroed(kind: SampleKind, len: usize) -> Self {
        match kind {
            SampleKind::F32 => Self::F32(vec![0.0; len]),
            SampleKind::I16 => Self::I16(vec![0; len]),
            SampleKind::I32 => Self::I32(vec![0; len]),
        }
    }

    /// Copy `count` samples from `src[read..]` into `self[write..]`.
    /// Returns false when the representations differ.
    fn copy_range(&mut self, write: usize, src: &ChannelPlane, read: usize, count: usize) -> bool {
        match (self, src) {
            (Self::F32(dst), Self::F32(src)) => {
                dst[write..write + count].copy_from_slice(&src[read..read + count])
            }
            (Self::I16(dst), Self::I16(src)) => {
                dst[write..write + count].copy_from_slice(&src[read..read + count])
            }
            (Self::I32(dst), Self::I32(src)) => {
                dst[write..write + count].copy_from_slice(&src[read..read + count])
            }
            _ => return false,
        }
        true
    }

    #[inline]
    fn sample_f32(&self, index: usize) -> f32 {
        match self {
            Self::F32(data) => data[index],
            Self::I16(data) => data[index] as f32 / 32_768.0,
            Self::I32(data) => (data[index] as f64 / 2_147_483_648.0) as f32,
        }
    }
}

/// A fixed-capacity multichannel sample buffer.
///
/// `frame_length <= frame_capacity` always holds; the capacity never changes
/// after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    format: AudioFormat,
    frame_capacity: usize,
    frame_length: usize,
    planes: SmallVec<[ChannelPlane; 2]>,
}

impl PcmBuffer {
    /// Create an empty buffer (fill length zero) able to hold `frame_capacity` frames.
    pub fn new(format: AudioFormat, frame_capacity: usize) -> Self {
        let planes = (0..format.channels)
            .map(|_| ChannelPlane::zeroed(format.sample_kind, frame_capacity))
            .collect();
        Self {
            format,
            frame_capacity,
            frame_length: 0,
            planes,
        }
    }

    /// Build a full float buffer from planar channel data.
    ///
    /// All channels are truncated to the shortest one.
    pub fn from_planar_f32(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        let format = AudioFormat::float(sample_rate, channels.len() as u16);
        let planes = channels
            .into_iter()
            .map(|mut c| {
                c.truncate(frames);
                ChannelPlane::F32(c)
            })
            .collect();
        Self {
            format,
            frame_capacity: frames,
            frame_length: frames,
            planes,
        }
    }

    /// Build a full float buffer from interleaved samples.
    pub fn from_interleaved_f32(sample_rate: u32, channels: u16, data: &[f32]) -> Self {
        let planes = deinterleave(data, channels)
            .into_iter()
            .map(ChannelPlane::F32)
            .collect();
        Self::from_planes(AudioFormat::float(sample_rate, channels), planes)
    }

    /// Build a full 16-bit buffer from interleaved samples.
    pub fn from_interleaved_i16(sample_rate: u32, channels: u16, data: &[i16]) -> Self {
        let planes = deinterleave(data, channels)
            .into_iter()
            .map(ChannelPlane::I16)
            .collect();
        Self::from_planes(
            AudioFormat::new(sample_rate, channels, SampleKind::I16),
            planes,
        )
    }

    /// Build a full 32-bit integer buffer from interleaved samples.
    pub fn from_interleaved_i32(sample_rate: u32, channels: u16, data: &[i32]) -> Self {
        let planes = deinterleave(data, channels)
            .into_iter()
            .map(ChannelPlane::I32)
            .collect();
        Self::from_planes(
            AudioFormat::new(sample_rate, channels, SampleKind::I32),
            planes,
        )
    }

    fn from_planes(format: AudioFormat, planes: SmallVec<[ChannelPlane; 2]>) -> Self {
        let frames = planes
            .first()
            .map(|p| match p {
                ChannelPlane::F32(d) => d.len(),
                ChannelPlane::I16(d) => d.len(),
                ChannelPlane::I32(d) => d.len(),
            })
            .unwrap_or(0);
        Self {
            format,
            frame_capacity: frames,
            frame_length: frames,
            planes,
        }
    }

    /// Sample format of this buffer.
    #[inline]
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Sample rate in Hz.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    /// Number of channels.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.planes.len()
    }

    /// Maximum number of frames this buffer can hold.
    #[inline]
    pub fn frame_capacity(&self) -> usize {
        self.frame_capacity
    }

    /// Number of valid frames.
    #[inline]
    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    /// Frames that can still be appended.
    #[inline]
    pub fn remaining_capacity(&self) -> usize {
        self.frame_capacity - self.frame_length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frame_length == 0
    }

    /// Duration of the valid frames in seconds.
    pub fn duration(&self) -> f64 {
        self.format.frames_to_seconds(self.frame_length as u64)
    }

    /// Borrow a float channel's valid samples. `None` for integer buffers.
    pub fn channel_f32(&self, channel: usize) -> Option<&[f32]> {
        match self.planes.get(channel)? {
            ChannelPlane::F32(data) => Some(&data[..self.frame_length]),
            _ => None,
        }
    }

    /// One sample normalized to float, whatever the stored representation.
    ///
    /// Panics if `channel` or `frame` is out of range.
    #[inline]
    pub fn sample_f32(&self, channel: usize, frame: usize) -> f32 {
        debug_assert!(frame < self.frame_length);
        self.planes[channel].sample_f32(frame)
    }

    /// Reset the fill length to zero, keeping capacity.
    pub fn clear(&mut self) {
        self.frame_length = 0;
    }

    /// Append up to `frame_count` frames from `source`, starting at `read_offset`.
    ///
    /// Copies `min(frame_count, remaining capacity, source frames after offset)`
    /// frames and returns that count. A format mismatch or an empty overlap
    /// copies nothing and returns zero.
    pub fn copy_from(&mut self, source: &PcmBuffer, read_offset: usize, frame_count: usize) -> usize {
        self.try_copy_from(source, read_offset, frame_count)
            .unwrap_or(0)
    }

    /// Like [`copy_from`](Self::copy_from) but reports format mismatches.
    pub fn try_copy_from(
        &mut self,
        source: &PcmBuffer,
        read_offset: usize,
        frame_count: usize,
    ) -> Result<usize> {
        if self.format != source.format {
            return Err(TrackdeckError::FormatMismatch(format!(
                "cannot copy {} into {}",
                source.format, self.format
            )));
        }

        let available = source.frame_length.saturating_sub(read_offset);
        let count = frame_count.min(self.remaining_capacity()).min(available);
        if count == 0 {
            return Ok(0);
        }

        let write = self.frame_length;
        for (dst, src) in self.planes.iter_mut().zip(source.planes.iter()) {
            if !dst.copy_range(write, src, read_offset, count) {
                return Err(TrackdeckError::FormatMismatch(
                    "channel representation differs".into(),
                ));
            }
        }
        self.frame_length += count;
        Ok(count)
    }

    /// New buffer holding frames `[from_frame, frame_length)`.
    pub fn extract_suffix(&self, from_frame: usize) -> Option<PcmBuffer> {
        if from_frame >= self.frame_length {
            return None;
        }
        let capacity = self.frame_length - from_frame;
        let mut out = PcmBuffer::new(self.format, capacity);
        (out.copy_from(self, from_frame, capacity) > 0).then_some(out)
    }

    /// New buffer holding the first `count` frames (or fewer if shorter).
    pub fn extract_prefix(&self, count: usize) -> Option<PcmBuffer> {
        let mut out = PcmBuffer::new(self.format, count);
        (out.copy_from(self, 0, count.min(self.frame_length)) > 0).then_some(out)
    }

    /// New buffer holding the audio between `start_time` and `end_time` seconds.
    ///
    /// An `end_time` of zero means "to the end of the buffer". Fails when the
    /// range is empty or starts at or after the last valid frame.
    pub fn extract_range(&self, start_time: f64, end_time: f64) -> Option<PcmBuffer> {
        if !start_time.is_finite() || !end_time.is_finite() || start_time < 0.0 {
            return None;
        }
        let rate = self.format.sample_rate as f64;
        let start_frame = (start_time * rate) as usize;
        let end_frame = if end_time == 0.0 {
            self.frame_length
        } else {
            (end_time * rate) as usize
        };
        if end_frame <= start_frame {
            return None;
        }

        let capacity = end_frame - start_frame;
        let mut out = PcmBuffer::new(self.format, capacity);
        (out.copy_from(self, start_frame, capacity) > 0).then_some(out)
    }

    /// Downsampled absolute-amplitude summary of the first channel.
    ///
    /// Each output value is the mean of `|sample|` over a non-overlapping
    /// window of `compression` frames; a trailing partial window is dropped.
    pub fn compressed_envelope(&self, compression: usize) -> Vec<f32> {
        let compression = compression.max(1);
        let Some(plane) = self.planes.first() else {
            return Vec::new();
        };
        let windows = self.frame_length / compression;
        let scale = 1.0 / compression as f32;

        (0..windows)
            .map(|w| {
                let start = w * compression;
                (start..start + compression)
                    .map(|i| plane.sample_f32(i).abs())
                    .sum::<f32>()
                    * scale
            })
            .collect()
    }

    /// Write interleaved float samples into this buffer, replacing its
    /// contents. Writes at most `frame_capacity` frames and returns the count.
    pub fn fill_from_interleaved_f32(&mut self, data: &[f32]) -> usize {
        let channels = self.planes.len().max(1);
        let frames = (data.len() / channels).min(self.frame_capacity);
        for (c, plane) in self.planes.iter_mut().enumerate() {
            for f in 0..frames {
                let s = data[f * channels + c];
                match plane {
                    ChannelPlane::F32(d) => d[f] = s,
                    ChannelPlane::I16(d) => d[f] = (s.clamp(-1.0, 1.0) * 32_767.0) as i16,
                    ChannelPlane::I32(d) => {
                        d[f] = (s.clamp(-1.0, 1.0) as f64 * 2_147_483_647.0) as i32
                    }
                }
            }
        }
        self.frame_length = frames;
        frames
    }

    /// Interleave the valid frames as normalized floats.
    pub fn to_interleaved_f32(&self) -> Vec<f32> {
        let channels = self.planes.len();
        let mut out = Vec::with_capacity(self.frame_length * channels);
        for f in 0..self.frame_length {
            for plane in &self.planes {
                out.push(plane.sample_f32(f));
            }
        }
        out
    }

    /// Total sample memory held by this buffer in bytes.
    pub fn memory_size(&self) -> usize {
        self.frame_capacity * self.format.bytes_per_frame()
    }
}

fn deinterleave<T: Copy>(data: &[T], channels: u16) -> SmallVec<[Vec<T>; 2]> {
    let channels = channels.max(1) as usize;
    let frames = data.len() / channels;
    (0..channels)
        .map(|c| (0..frames).map(|f| data[f * channels + c]).collect())
        .collect()
}
