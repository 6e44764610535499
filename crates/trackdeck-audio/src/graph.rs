//! The render graph: every attached track player feeding one mix point.
//!
//! The same graph is pulled by the live output device and by the offline
//! renderer. Rendering never blocks: if a player is locked by the control
//! domain the block comes out silent and the call reports
//! [`RenderStatus::CannotDoInCurrentContext`].

use smallvec::SmallVec;
use trackdeck_core::AudioFormat;

use crate::mixer::Mixer;
use crate::player::SharedPlayer;

/// Called after every rendered block with the graph's sample time (frames
/// rendered since the graph was last reset) and its sample rate.
pub type RenderTap = Box<dyn FnMut(u64, u32) + Send>;

/// Outcome of one render call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// The requested frames were rendered.
    Success,
    /// A live input could not supply enough data. Benign.
    InsufficientDataFromInput,
    /// The graph is busy; retry the same block.
    CannotDoInCurrentContext,
    /// Unrecoverable failure.
    Error,
}

/// Players connected to a single mix point.
pub struct RenderGraph {
    format: AudioFormat,
    players: Vec<SharedPlayer>,
    mixer: Mixer,
    sample_time: u64,
    tap: Option<RenderTap>,
}

impl RenderGraph {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            players: Vec::new(),
            mixer: Mixer::new(),
            sample_time: 0,
            tap: None,
        }
    }

    /// Output format of the mix point.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Switch the mix format. Resets the sample time.
    pub fn set_format(&mut self, format: AudioFormat) {
        self.format = format;
        self.sample_time = 0;
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn mixer_mut(&mut self) -> &mut Mixer {
        &mut self.mixer
    }

    /// Connect a player to the mix point.
    pub fn attach(&mut self, player: SharedPlayer) {
        self.players.push(player);
    }

    /// Disconnect every player.
    pub fn detach_all(&mut self) {
        self.players.clear();
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Frames rendered since the last reset.
    pub fn sample_time(&self) -> u64 {
        self.sample_time
    }

    pub fn reset_sample_time(&mut self) {
        self.sample_time = 0;
    }

    pub fn install_tap(&mut self, tap: RenderTap) {
        self.tap = Some(tap);
    }

    pub fn remove_tap(&mut self) {
        self.tap = None;
    }

    /// Render one interleaved block into `out`.
    pub fn render(&mut self, out: &mut [f32]) -> RenderStatus {
        let channels = self.format.channels as usize;
        if channels == 0 || out.len() % channels != 0 {
            out.fill(0.0);
            return RenderStatus::Error;
        }

        let mut guards: SmallVec<[_; 8]> = SmallVec::with_capacity(self.players.len());
        for player in &self.players {
            match player.try_lock() {
                Some(guard) => guards.push(guard),
                None => {
                    out.fill(0.0);
                    return RenderStatus::CannotDoInCurrentContext;
                }
            }
        }

        self.mixer.mix(
            guards.iter_mut().map(|g| &mut **g),
            self.format.sample_rate,
            channels,
            out,
        );
        drop(guards);

        self.sample_time += (out.len() / channels) as u64;
        if let Some(tap) = self.tap.as_mut() {
            tap(self.sample_time, self.format.sample_rate);
        }
        RenderStatus::Success
    }
}
