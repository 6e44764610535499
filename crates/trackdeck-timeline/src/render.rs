//! Offline mixdown.
//!
//! Drives the engine in manual rendering mode: every track is scheduled
//! from zero, then fixed-size blocks are pulled through the graph and
//! handed to an export sink until the content length (duration minus the
//! trailing margin) has been written.

use tracing::{debug, error, info, warn};
use trackdeck_audio::{AudioEngine, RenderStatus};
use trackdeck_core::{seconds_to_frames_rounded, AudioFormat, PcmBuffer, Result, TrackdeckError};
use trackdeck_media::{ExportProgress, ExportSink};

use crate::timeline::Timeline;

/// Consecutive busy or empty render calls tolerated before giving up.
const MAX_STALLED_CALLS: u32 = 1000;

/// Block-wise offline renderer.
#[derive(Debug, Clone, Copy)]
pub struct OfflineRenderer {
    max_frames: usize,
}

impl OfflineRenderer {
    pub fn new(max_frames: usize) -> Self {
        Self {
            max_frames: max_frames.max(1),
        }
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Frames an export of `timeline` at `sample_rate` will contain.
    pub fn target_frames(timeline: &Timeline, sample_rate: u32) -> u64 {
        let content = timeline.duration() - timeline.config().trailing_margin;
        seconds_to_frames_rounded(content.max(0.0), sample_rate)
    }

    /// Render the whole timeline into `sink` in `format`. Returns the
    /// number of frames written. The sink is not finished.
    ///
    /// Manual rendering is switched off and every player stopped on the
    /// way out, whether or not rendering succeeded.
    pub fn render(
        &self,
        timeline: &mut Timeline,
        format: AudioFormat,
        sink: &mut dyn ExportSink,
        mut progress: impl FnMut(ExportProgress),
    ) -> Result<u64> {
        if timeline.is_playing() {
            timeline.stop();
        }

        let target = Self::target_frames(timeline, format.sample_rate);
        let any_solo = timeline.any_solo();
        for track in timeline.tracks() {
            track.player().lock().stop();
            track.schedule(0.0, any_solo);
        }

        let result = match timeline.engine_mut().enable_manual_rendering(format, self.max_frames) {
            Ok(()) => {
                for track in timeline.tracks() {
                    track.player().lock().play();
                }
                info!("Rendering {} frames at {} Hz", target, format.sample_rate);
                self.pump(timeline.engine_mut(), format, target, sink, &mut progress)
            }
            Err(e) => Err(e),
        };

        timeline.engine_mut().disable_manual_rendering();
        for track in timeline.tracks() {
            track.player().lock().stop();
        }
        result
    }

    fn pump(
        &self,
        engine: &mut AudioEngine,
        format: AudioFormat,
        target: u64,
        sink: &mut dyn ExportSink,
        progress: &mut impl FnMut(ExportProgress),
    ) -> Result<u64> {
        let mut block = PcmBuffer::new(format, self.max_frames);
        let mut written = 0u64;
        let mut stalled = 0u32;

        while written < target {
            let frames = (target - written).min(self.max_frames as u64) as usize;
            match engine.render_offline(frames, &mut block)? {
                RenderStatus::Success if !block.is_empty() => {
                    stalled = 0;
                    sink.write(&block)?;
                    written += block.frame_length() as u64;
                    progress(ExportProgress {
                        frames_written: written,
                        total_frames: target,
                    });
                }
                RenderStatus::Error => {
                    error!("Render failed at frame {}", written);
                    return Err(TrackdeckError::Render(format!(
                        "render failed after {} of {} frames",
                        written, target
                    )));
                }
                status => {
                    stalled += 1;
                    if stalled > MAX_STALLED_CALLS {
                        warn!("Renderer stalled: {:?}", status);
                        return Err(TrackdeckError::Render(format!(
                            "renderer made no progress after {} calls ({:?})",
                            MAX_STALLED_CALLS, status
                        )));
                    }
                    if status == RenderStatus::CannotDoInCurrentContext {
                        std::thread::yield_now();
                    }
                }
            }
        }

        debug!("Rendered {} frames", written);
        Ok(written)
    }
}
