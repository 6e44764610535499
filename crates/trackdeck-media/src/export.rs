//! Export sinks for rendered mixdowns.
//!
//! PCM exports are written directly with hound. Compressed codecs are
//! encoded by piping raw float PCM into an `ffmpeg` process.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use tracing::{debug, info};
use trackdeck_core::{AudioFormat, PcmBuffer, Result, SampleKind, TrackdeckError};

// ── Settings ────────────────────────────────────────────────────

/// Output codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AudioCodec {
    #[default]
    Aac,
    Pcm,
    Flac,
    Opus,
}

impl AudioCodec {
    /// FFmpeg encoder name. PCM never goes through ffmpeg.
    pub fn ffmpeg_encoder(self) -> Option<&'static str> {
        match self {
            Self::Aac => Some("aac"),
            Self::Pcm => None,
            Self::Flac => Some("flac"),
            Self::Opus => Some("libopus"),
        }
    }

    /// File extension for this codec.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Aac => "m4a",
            Self::Pcm => "wav",
            Self::Flac => "flac",
            Self::Opus => "opus",
        }
    }

    /// Guess a codec from an output path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "m4a" | "aac" | "mp4" => Some(Self::Aac),
            "wav" => Some(Self::Pcm),
            "flac" => Some(Self::Flac),
            "opus" | "ogg" => Some(Self::Opus),
            _ => None,
        }
    }

    fn bitrate(self) -> Option<&'static str> {
        match self {
            Self::Aac => Some("256k"),
            Self::Opus => Some("160k"),
            Self::Pcm | Self::Flac => None,
        }
    }
}

/// Where and how a mixdown is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Output file path.
    pub path: PathBuf,
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u16,
    /// Sample representation written by the WAV sink.
    pub sample_kind: SampleKind,
}

impl ExportSettings {
    /// Settings taken from the live mix format with `codec` substituted in.
    pub fn from_mix_format(path: impl Into<PathBuf>, mix: AudioFormat, codec: AudioCodec) -> Self {
        Self {
            path: path.into(),
            codec,
            sample_rate: mix.sample_rate,
            channels: mix.channels,
            sample_kind: mix.sample_kind,
        }
    }

    /// Float format the renderer must produce for this export.
    pub fn render_format(&self) -> AudioFormat {
        AudioFormat::float(self.sample_rate, self.channels)
    }
}

/// Export progress information.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportProgress {
    /// Frames rendered and written so far.
    pub frames_written: u64,
    /// Frames the export will contain.
    pub total_frames: u64,
}

impl ExportProgress {
    /// Completion fraction (0.0 to 1.0).
    pub fn fraction(&self) -> f64 {
        if self.total_frames == 0 {
            return 0.0;
        }
        self.frames_written as f64 / self.total_frames as f64
    }
}

// ── Sinks ───────────────────────────────────────────────────────

/// Destination for rendered blocks.
pub trait ExportSink: Send {
    /// Append the valid frames of `block`.
    fn write(&mut self, block: &PcmBuffer) -> Result<()>;

    /// Flush and close the output. Further writes fail.
    fn finish(&mut self) -> Result<()>;

    fn frames_written(&self) -> u64;
}

/// Open the sink matching `settings.codec`.
pub fn open_sink(settings: &ExportSettings) -> Result<Box<dyn ExportSink>> {
    match settings.codec {
        AudioCodec::Pcm => Ok(Box::new(WavSink::create(settings)?)),
        _ => Ok(Box::new(FfmpegSink::spawn(settings)?)),
    }
}

fn check_channels(block: &PcmBuffer, channels: u16) -> Result<()> {
    if block.channel_count() != channels as usize {
        return Err(TrackdeckError::FormatMismatch(format!(
            "block has {} channels, sink expects {}",
            block.channel_count(),
            channels
        )));
    }
    Ok(())
}

fn encoder_error(e: impl std::fmt::Display) -> TrackdeckError {
    TrackdeckError::Encoder(e.to_string())
}

/// WAV file sink.
pub struct WavSink {
    writer: Option<hound::WavWriter<std::io::BufWriter<std::fs::File>>>,
    sample_kind: SampleKind,
    channels: u16,
    frames: u64,
}

impl WavSink {
    pub fn create(settings: &ExportSettings) -> Result<Self> {
        let (bits_per_sample, sample_format) = match settings.sample_kind {
            SampleKind::F32 => (32, hound::SampleFormat::Float),
            SampleKind::I16 => (16, hound::SampleFormat::Int),
            SampleKind::I32 => (32, hound::SampleFormat::Int),
        };
        let spec = hound::WavSpec {
            channels: settings.channels,
            sample_rate: settings.sample_rate,
            bits_per_sample,
            sample_format,
        };
        let writer = hound::WavWriter::create(&settings.path, spec).map_err(encoder_error)?;
        info!("Writing WAV to {}", settings.path.display());
        Ok(Self {
            writer: Some(writer),
            sample_kind: settings.sample_kind,
            channels: settings.channels,
            frames: 0,
        })
    }
}

impl ExportSink for WavSink {
    fn write(&mut self, block: &PcmBuffer) -> Result<()> {
        check_channels(block, self.channels)?;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| TrackdeckError::Encoder("WAV sink already finished".into()))?;

        for frame in 0..block.frame_length() {
            for channel in 0..block.channel_count() {
                let s = block.sample_f32(channel, frame);
                match self.sample_kind {
                    SampleKind::F32 => writer.write_sample(s),
                    SampleKind::I16 => writer.write_sample((s.clamp(-1.0, 1.0) * 32_767.0) as i16),
                    SampleKind::I32 => writer
                        .write_sample((s.clamp(-1.0, 1.0) as f64 * 2_147_483_647.0) as i32),
                }
                .map_err(encoder_error)?;
            }
        }
        self.frames += block.frame_length() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(encoder_error)?;
            debug!("WAV sink finalized after {} frames", self.frames);
        }
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }
}

/// Compressed-codec sink: float PCM piped into `ffmpeg`.
pub struct FfmpegSink {
    child: Child,
    stdin: Option<ChildStdin>,
    channels: u16,
    frames: u64,
}

impl FfmpegSink {
    /// Build the FFmpeg command arguments.
    pub fn ffmpeg_args(settings: &ExportSettings) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-f".into(),
            "f32le".into(),
            "-ar".into(),
            settings.sample_rate.to_string(),
            "-ac".into(),
            settings.channels.to_string(),
            "-i".into(),
            "pipe:0".into(),
        ];
        if let Some(encoder) = settings.codec.ffmpeg_encoder() {
            args.extend_from_slice(&["-c:a".into(), encoder.into()]);
        }
        if let Some(bitrate) = settings.codec.bitrate() {
            args.extend_from_slice(&["-b:a".into(), bitrate.into()]);
        }
        args.push(settings.path.to_string_lossy().into_owned());
        args
    }

    pub fn spawn(settings: &ExportSettings) -> Result<Self> {
        let ffmpeg = which::which("ffmpeg")
            .map_err(|e| TrackdeckError::Encoder(format!("ffmpeg not found: {}", e)))?;
        let mut child = Command::new(ffmpeg)
            .args(Self::ffmpeg_args(settings))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| TrackdeckError::Encoder(format!("Failed to spawn ffmpeg: {}", e)))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TrackdeckError::Encoder("Failed to open ffmpeg stdin".into()))?;

        info!(
            "Encoding {:?} to {} via ffmpeg",
            settings.codec,
            settings.path.display()
        );
        Ok(Self {
            child,
            stdin: Some(stdin),
            channels: settings.channels,
            frames: 0,
        })
    }
}

impl ExportSink for FfmpegSink {
    fn write(&mut self, block: &PcmBuffer) -> Result<()> {
        check_channels(block, self.channels)?;
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| TrackdeckError::Encoder("ffmpeg sink already finished".into()))?;
        let samples = block.to_interleaved_f32();
        stdin
            .write_all(bytemuck::cast_slice(&samples))
            .map_err(|e| TrackdeckError::Encoder(format!("Failed to write samples: {}", e)))?;
        self.frames += block.frame_length() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let Some(stdin) = self.stdin.take() else {
            return Ok(());
        };
        // Close stdin to signal end-of-stream
        drop(stdin);

        let status = self
            .child
            .wait()
            .map_err(|e| TrackdeckError::Encoder(format!("Failed to wait for ffmpeg: {}", e)))?;
        if !status.success() {
            return Err(TrackdeckError::Encoder(format!(
                "ffmpeg exited with status: {}",
                status
            )));
        }
        debug!("ffmpeg finished after {} frames", self.frames);
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.stdin.take().is_some() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Sink collecting interleaved float samples in memory.
pub struct MemorySink {
    channels: u16,
    shared: MemoryExport,
}

/// Read side of a [`MemorySink`], usable after the sink has been consumed.
#[derive(Debug, Clone, Default)]
pub struct MemoryExport {
    inner: Arc<Mutex<MemoryContents>>,
}

#[derive(Debug, Default)]
struct MemoryContents {
    samples: Vec<f32>,
    frames: u64,
    finished: bool,
}

impl MemorySink {
    pub fn new(channels: u16) -> Self {
        Self {
            channels,
            shared: MemoryExport::default(),
        }
    }

    pub fn export(&self) -> MemoryExport {
        self.shared.clone()
    }
}

impl ExportSink for MemorySink {
    fn write(&mut self, block: &PcmBuffer) -> Result<()> {
        check_channels(block, self.channels)?;
        let mut inner = self.shared.inner.lock();
        if inner.finished {
            return Err(TrackdeckError::Encoder("memory sink already finished".into()));
        }
        inner.samples.extend(block.to_interleaved_f32());
        inner.frames += block.frame_length() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.shared.inner.lock().finished = true;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.shared.frames()
    }
}

impl MemoryExport {
    pub fn frames(&self) -> u64 {
        self.inner.lock().frames
    }

    /// Interleaved samples written so far.
    pub fn samples(&self) -> Vec<f32> {
        self.inner.lock().samples.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.lock().finished
    }
}
