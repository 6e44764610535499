//! Output devices: where the live render graph gets pulled from.

use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};
use trackdeck_core::{AudioFormat, Result, TrackdeckError};

/// Render callback handed to a device. Fills one interleaved block.
pub type RenderCallback = Box<dyn FnMut(&mut [f32]) + Send>;

/// A sink that periodically asks for interleaved audio.
pub trait OutputDevice: Send {
    /// Interleaved float format the device consumes.
    fn format(&self) -> AudioFormat;

    /// Begin pulling audio from `callback`.
    fn start(&mut self, callback: RenderCallback) -> Result<()>;

    /// Stop pulling and drop the callback.
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

// ── Null device ───────────────────────────────────────────────────

type CallbackSlot = Arc<Mutex<Option<RenderCallback>>>;

/// A device with no hardware behind it. Audio is pulled on demand
/// through a [`NullDeviceHandle`].
pub struct NullDevice {
    format: AudioFormat,
    slot: CallbackSlot,
}

/// Manual pull side of a [`NullDevice`].
#[derive(Clone)]
pub struct NullDeviceHandle {
    format: AudioFormat,
    slot: CallbackSlot,
}

impl NullDevice {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn handle(&self) -> NullDeviceHandle {
        NullDeviceHandle {
            format: self.format,
            slot: Arc::clone(&self.slot),
        }
    }
}

impl OutputDevice for NullDevice {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn start(&mut self, callback: RenderCallback) -> Result<()> {
        *self.slot.lock() = Some(callback);
        Ok(())
    }

    fn stop(&mut self) {
        *self.slot.lock() = None;
    }

    fn is_running(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl NullDeviceHandle {
    /// Pull `frames` frames through the render callback. `None` when the
    /// device is not running.
    pub fn pull(&self, frames: usize) -> Option<Vec<f32>> {
        let mut slot = self.slot.lock();
        let callback = slot.as_mut()?;
        let mut out = vec![0.0; frames * self.format.channels as usize];
        callback(&mut out);
        Some(out)
    }
}

// ── cpal device ───────────────────────────────────────────────────

struct StreamWorker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// The system default output device.
///
/// The device and stream config are resolved once when opened; every
/// stream started later uses that same pair. The cpal stream lives on
/// its own thread for its whole life, since streams are not `Send` on
/// every platform.
pub struct CpalDevice {
    device: cpal::Device,
    config: cpal::StreamConfig,
    format: AudioFormat,
    worker: Option<StreamWorker>,
}

impl CpalDevice {
    /// Open the default output device. Only float output is supported.
    pub fn open_default() -> Result<Self> {
        let (device, supported) = default_output()?;
        let config: cpal::StreamConfig = supported.into();
        let format = stream_format(&config);
        info!("Output device opened: {}", format);
        Ok(Self {
            device,
            config,
            format,
            worker: None,
        })
    }
}

/// Interleaved float format of a stream built from `config`.
fn stream_format(config: &cpal::StreamConfig) -> AudioFormat {
    AudioFormat::float(config.sample_rate.0, config.channels)
}

fn default_output() -> Result<(cpal::Device, cpal::SupportedStreamConfig)> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| TrackdeckError::Audio("no default output device".into()))?;
    let config = device
        .default_output_config()
        .map_err(|e| TrackdeckError::Audio(format!("no default output config: {}", e)))?;
    if config.sample_format() != cpal::SampleFormat::F32 {
        return Err(TrackdeckError::Audio(format!(
            "unsupported sample format {:?} (only f32 supported)",
            config.sample_format()
        )));
    }
    Ok((device, config))
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut callback: RenderCallback,
) -> Result<cpal::Stream> {
    use cpal::traits::{DeviceTrait, StreamTrait};

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| callback(data),
            |err| warn!("Output stream error: {}", err),
            None,
        )
        .map_err(|e| TrackdeckError::Audio(format!("failed to build output stream: {}", e)))?;
    stream
        .play()
        .map_err(|e| TrackdeckError::Audio(format!("failed to play output stream: {}", e)))?;
    Ok(stream)
}

impl OutputDevice for CpalDevice {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn start(&mut self, callback: RenderCallback) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let device = self.device.clone();
        let config = self.config.clone();

        let handle = std::thread::Builder::new()
            .name("trackdeck-output".into())
            .spawn(move || {
                let stream = match build_stream(&device, &config, callback) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Park until asked to stop; dropping the stream closes it.
                let _ = stop_rx.recv();
                drop(stream);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                debug!("Output stream running");
                self.worker = Some(StreamWorker { stop_tx, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(TrackdeckError::Audio(
                    "output thread exited before the stream started".into(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.handle.join();
            debug!("Output stream closed");
        }
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.stop();
    }
}
