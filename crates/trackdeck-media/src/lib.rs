//! Trackdeck Media - audio file I/O
//!
//! This crate handles:
//! - Decoding audio files into `PcmBuffer`s at their native format
//! - Export sinks: WAV via hound, compressed codecs via an ffmpeg pipe
//! - An in-memory sink for headless renders

pub mod decoder;
pub mod export;

pub use decoder::{AudioDecoder, MemoryDecoder, WavDecoder};
pub use export::{
    open_sink, AudioCodec, ExportProgress, ExportSettings, ExportSink, FfmpegSink, MemoryExport,
    MemorySink, WavSink,
};

/// Whether an `ffmpeg` binary is on the PATH (needed for compressed exports).
pub fn ffmpeg_available() -> bool {
    which::which("ffmpeg").is_ok()
}
