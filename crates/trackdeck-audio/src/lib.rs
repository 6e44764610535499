//! Trackdeck Audio - Playback engine
//!
//! Turns scheduled track buffers into mixed audio, either live through an
//! output device or offline through manual rendering.
//!
//! Architecture:
//! - `TrackPlayer`: per-track queue of scheduled buffers
//! - `Mixer`: sums players with volume/pan, master gain and limiter
//! - `RenderGraph`: the players attached to one mix point
//! - `OutputDevice`: cpal-backed or null sink pulling the graph
//! - `AudioEngine`: top-level orchestrator for live and manual rendering

pub mod clock;
pub mod device;
pub mod envelope;
pub mod graph;
pub mod mixer;
pub mod player;

pub use clock::TransportClock;
pub use device::{CpalDevice, NullDevice, NullDeviceHandle, OutputDevice, RenderCallback};
pub use envelope::{scaled_power, Envelope};
pub use graph::{RenderGraph, RenderStatus, RenderTap};
pub use mixer::{Mixer, MixerChannel};
pub use player::{PlayerState, ScheduledBuffer, SharedPlayer, TrackPlayer};

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};
use trackdeck_core::{AudioFormat, PcmBuffer, Result, SampleKind, TrackdeckError};

struct ManualRendering {
    format: AudioFormat,
    max_frames: usize,
    block: Vec<f32>,
}

/// Audio engine state.
pub struct AudioEngine {
    graph: Arc<Mutex<RenderGraph>>,
    device: Box<dyn OutputDevice>,
    running: bool,
    manual: Option<ManualRendering>,
}

impl AudioEngine {
    /// Create an engine that plays through `device`.
    pub fn new(device: Box<dyn OutputDevice>) -> Self {
        info!("Initializing audio engine ({})", device.format());
        Self {
            graph: Arc::new(Mutex::new(RenderGraph::new(device.format()))),
            device,
            running: false,
            manual: None,
        }
    }

    /// Engine backed by a [`NullDevice`], for offline work and tests.
    pub fn headless(format: AudioFormat) -> Self {
        Self::new(Box::new(NullDevice::new(format)))
    }

    /// Current mix format: the manual rendering format while manual
    /// rendering is enabled, the device format otherwise.
    pub fn output_format(&self) -> AudioFormat {
        self.graph.lock().format()
    }

    /// Connect a track player to the mix point.
    pub fn attach(&self, player: SharedPlayer) {
        self.graph.lock().attach(player);
    }

    /// Disconnect every player.
    pub fn detach_all(&self) {
        self.graph.lock().detach_all();
    }

    /// Start live delivery. Resets the graph's sample time.
    pub fn start(&mut self) -> Result<()> {
        if self.manual.is_some() {
            return Err(TrackdeckError::Audio(
                "cannot start live output while manual rendering is enabled".into(),
            ));
        }
        if self.running {
            return Ok(());
        }

        self.graph.lock().reset_sample_time();
        let graph = Arc::clone(&self.graph);
        self.device.start(Box::new(move |out: &mut [f32]| {
            // Never wait on the control domain from the device callback.
            match graph.try_lock() {
                Some(mut graph) => {
                    graph.render(out);
                }
                None => out.fill(0.0),
            }
        }))?;
        self.running = true;
        info!("Audio playback started");
        Ok(())
    }

    /// Stop live delivery.
    pub fn stop(&mut self) {
        if self.running {
            self.device.stop();
            self.running = false;
            info!("Audio playback stopped");
        }
    }

    /// Check if live delivery is running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Install the position feed, called after every rendered block.
    pub fn install_tap(&self, tap: RenderTap) {
        self.graph.lock().install_tap(tap);
    }

    pub fn remove_tap(&self) {
        self.graph.lock().remove_tap();
    }

    /// Switch to pull-driven offline rendering in `format`, rendering at
    /// most `max_frames` per call.
    pub fn enable_manual_rendering(&mut self, format: AudioFormat, max_frames: usize) -> Result<()> {
        if self.running {
            return Err(TrackdeckError::Render(
                "stop the engine before enabling manual rendering".into(),
            ));
        }
        if max_frames == 0 || format.channels == 0 || format.sample_rate == 0 {
            return Err(TrackdeckError::InvalidParameter(format!(
                "invalid manual rendering setup: {} / {} frames",
                format, max_frames
            )));
        }
        if format.sample_kind != SampleKind::F32 {
            return Err(TrackdeckError::FormatMismatch(format!(
                "manual rendering needs a float format, got {}",
                format
            )));
        }

        self.graph.lock().set_format(format);
        self.manual = Some(ManualRendering {
            format,
            max_frames,
            block: vec![0.0; max_frames * format.channels as usize],
        });
        debug!("Manual rendering enabled: {}, {} frames per call", format, max_frames);
        Ok(())
    }

    /// Leave manual rendering and restore the device format.
    pub fn disable_manual_rendering(&mut self) {
        if self.manual.take().is_some() {
            self.graph.lock().set_format(self.device.format());
            debug!("Manual rendering disabled");
        }
    }

    pub fn is_manual_rendering(&self) -> bool {
        self.manual.is_some()
    }

    /// Frames rendered since manual rendering was enabled.
    pub fn manual_rendering_sample_time(&self) -> u64 {
        self.graph.lock().sample_time()
    }

    /// Largest frame count accepted by [`render_offline`](Self::render_offline).
    pub fn manual_max_frames(&self) -> Option<usize> {
        self.manual.as_ref().map(|m| m.max_frames)
    }

    /// Render `frames` frames into `out`, replacing its contents.
    ///
    /// `out` must be in the manual rendering format with room for `frames`.
    /// On any status other than [`RenderStatus::Success`] `out` is left
    /// empty.
    pub fn render_offline(&mut self, frames: usize, out: &mut PcmBuffer) -> Result<RenderStatus> {
        let manual = self
            .manual
            .as_mut()
            .ok_or_else(|| TrackdeckError::Render("manual rendering is not enabled".into()))?;
        if frames > manual.max_frames {
            return Err(TrackdeckError::InvalidParameter(format!(
                "{} frames exceeds the per-call maximum of {}",
                frames, manual.max_frames
            )));
        }
        if out.format() != manual.format {
            return Err(TrackdeckError::FormatMismatch(format!(
                "render target is {}, engine renders {}",
                out.format(),
                manual.format
            )));
        }
        if out.frame_capacity() < frames {
            return Err(TrackdeckError::InvalidParameter(format!(
                "render target holds {} frames, {} requested",
                out.frame_capacity(),
                frames
            )));
        }

        let block = &mut manual.block[..frames * manual.format.channels as usize];
        let status = self.graph.lock().render(block);
        out.clear();
        if status == RenderStatus::Success {
            out.fill_from_interleaved_f32(block);
        }
        Ok(status)
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
