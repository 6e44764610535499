//! The timeline: tracks, transport and every structural mutation.
//!
//! Control operations never return errors. Failures land in
//! [`Timeline::last_error`] and are broadcast as [`TimelineEvent::Error`].
//!
//! Any mutation that can change what is audible is wrapped in
//! stop/mutate/resume, so the render domain never sees a topology change
//! mid-flight.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use trackdeck_audio::{AudioEngine, TransportClock};
use trackdeck_core::{EngineConfig, PcmBuffer, Result, TimeRange};
use trackdeck_media::{open_sink, AudioCodec, AudioDecoder, ExportProgress, ExportSettings, ExportSink};
use uuid::Uuid;

use crate::clip::Clip;
use crate::clipboard::{Clipboard, ClipboardPayload, MemoryClipboard};
use crate::edit::{EditCommand, UndoStack};
use crate::render::OfflineRenderer;
use crate::serialization::{DocumentFile, TrackRecord};
use crate::track::Track;

/// Recoverable failure recorded on the timeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimelineError {
    #[error("Failed to decode {locator}: {message}")]
    Decode { locator: String, message: String },

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Audio output failed: {0}")]
    Output(String),

    #[error("Clipboard error: {0}")]
    Clipboard(String),
}

impl TimelineError {
    fn decode(locator: &Path, error: impl std::fmt::Display) -> Self {
        Self::Decode {
            locator: locator.display().to_string(),
            message: error.to_string(),
        }
    }
}

/// Whether a long-running import or export is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimelineState {
    #[default]
    Ready,
    /// Callers should hold off on further mutations.
    Processing,
}

/// Change notifications pushed to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEvent {
    TracksChanged,
    ClipsChanged,
    SelectionChanged,
    TransportChanged { playing: bool, time: f64 },
    StateChanged(TimelineState),
    Error(TimelineError),
}

/// One open document's tracks and transport.
pub struct Timeline {
    tracks: Vec<Track>,
    engine: AudioEngine,
    config: EngineConfig,
    clock: TransportClock,
    playing: bool,
    state: TimelineState,
    pending_jobs: usize,
    last_error: Option<TimelineError>,
    visible_range: TimeRange,
    selected_range: Option<TimeRange>,
    history: UndoStack,
    clipboard: Box<dyn Clipboard>,
    revision: u64,
    subscribers: Vec<Sender<TimelineEvent>>,
}

impl Timeline {
    /// Create an empty timeline playing through `engine`.
    pub fn new(engine: AudioEngine, config: EngineConfig) -> Self {
        let visible_range = TimeRange::new(0.0, config.trailing_margin);
        Self {
            tracks: Vec::new(),
            engine,
            history: UndoStack::new(config.undo_depth),
            config,
            clock: TransportClock::default(),
            playing: false,
            state: TimelineState::Ready,
            pending_jobs: 0,
            last_error: None,
            visible_range,
            selected_range: None,
            clipboard: Box::new(MemoryClipboard::new()),
            revision: 0,
            subscribers: Vec::new(),
        }
    }

    /// Timeline on a headless engine in the configured mix format.
    pub fn headless(config: EngineConfig) -> Self {
        let engine = AudioEngine::headless(config.mix_format());
        Self::new(engine, config)
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: Uuid) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    fn track_mut(&mut self, id: Uuid) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }

    pub fn clip(&self, id: Uuid) -> Option<&Clip> {
        self.tracks.iter().find_map(|t| t.clip(id))
    }

    pub fn clips(&self) -> impl Iterator<Item = &Clip> {
        self.tracks.iter().flat_map(|t| t.clips().iter())
    }

    pub fn is_empty(&self) -> bool {
        self.clips().next().is_none()
    }

    /// Last clip end plus the trailing margin.
    pub fn duration(&self) -> f64 {
        let end = self.tracks.iter().map(Track::end_time).fold(0.0, f64::max);
        end + self.config.trailing_margin
    }

    /// Transport position in seconds. Advances while playing.
    pub fn current_time(&self) -> f64 {
        self.clock.seconds()
    }

    /// Shared handle on the transport position, for polling observers.
    pub fn clock(&self) -> TransportClock {
        self.clock.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn state(&self) -> TimelineState {
        self.state
    }

    pub fn last_error(&self) -> Option<&TimelineError> {
        self.last_error.as_ref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn visible_range(&self) -> TimeRange {
        self.visible_range
    }

    pub fn set_visible_range(&mut self, range: TimeRange) {
        self.visible_range = range;
    }

    pub fn selected_range(&self) -> Option<TimeRange> {
        self.selected_range
    }

    pub fn set_selected_range(&mut self, range: Option<TimeRange>) {
        self.selected_range = range;
        self.emit(TimelineEvent::SelectionChanged);
    }

    pub fn any_solo(&self) -> bool {
        self.tracks.iter().any(|t| t.solo)
    }

    /// Effective mute of a track.
    pub fn is_track_muted(&self, id: Uuid) -> Option<bool> {
        let any_solo = self.any_solo();
        self.track(id).map(|t| t.is_muted(any_solo))
    }

    pub fn engine(&self) -> &AudioEngine {
        &self.engine
    }

    pub fn history(&self) -> &UndoStack {
        &self.history
    }

    pub fn set_clipboard(&mut self, clipboard: Box<dyn Clipboard>) {
        self.clipboard = clipboard;
    }

    // ── Notifications ────────────────────────────────────────────

    /// Counter bumped on every observable change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Receive every future change notification.
    pub fn subscribe(&mut self) -> Receiver<TimelineEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: TimelineEvent) {
        self.revision += 1;
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn fail(&mut self, error: TimelineError) {
        warn!("{}", error);
        self.last_error = Some(error.clone());
        self.emit(TimelineEvent::Error(error));
    }

    fn set_state(&mut self, state: TimelineState) {
        if self.state != state {
            self.state = state;
            self.emit(TimelineEvent::StateChanged(state));
        }
    }

    // ── Transport ────────────────────────────────────────────────

    /// Start playback from the current position, or stop if already
    /// playing.
    pub fn play(&mut self) {
        if self.playing {
            self.stop();
            return;
        }

        let start = self.current_time();
        let any_solo = self.any_solo();
        for track in &self.tracks {
            track.player().lock().stop();
            track.schedule(start, any_solo);
        }
        for track in &self.tracks {
            track.player().lock().play();
        }

        let clock = self.clock.clone();
        self.engine.install_tap(Box::new(move |sample_time, sample_rate| {
            clock.publish(start + sample_time as f64 / sample_rate as f64);
        }));

        if let Err(e) = self.engine.start() {
            self.engine.remove_tap();
            for track in &self.tracks {
                track.player().lock().stop();
            }
            self.fail(TimelineError::Output(e.to_string()));
            return;
        }

        self.playing = true;
        info!("Playback started at {:.3}s", start);
        self.emit(TimelineEvent::TransportChanged {
            playing: true,
            time: start,
        });
    }

    /// Halt playback, keeping the position reached.
    pub fn stop(&mut self) {
        self.engine.stop();
        self.engine.remove_tap();
        for track in &self.tracks {
            track.player().lock().stop();
        }
        if self.playing {
            self.playing = false;
            let time = self.current_time();
            info!("Playback stopped at {:.3}s", time);
            self.emit(TimelineEvent::TransportChanged {
                playing: false,
                time,
            });
        }
    }

    /// Move the transport, clamped to `[0, duration]`. Playback restarts
    /// from the new position if it was running.
    pub fn seek(&mut self, time: f64) {
        let time = if time.is_finite() { time } else { 0.0 };
        let time = time.clamp(0.0, self.duration());
        self.with_transport_paused(|timeline| timeline.clock.publish(time));
        debug!("Seek to {:.3}s", time);
        self.emit(TimelineEvent::TransportChanged {
            playing: self.playing,
            time,
        });
    }

    /// Seek forward by the configured step.
    pub fn forward(&mut self) {
        self.selected_range = None;
        self.seek(self.current_time() + self.config.seek_step);
    }

    /// Seek backward by the configured step.
    pub fn backward(&mut self) {
        self.selected_range = None;
        self.seek(self.current_time() - self.config.seek_step);
    }

    /// Seek to the end of the content.
    pub fn forward_end(&mut self) {
        self.selected_range = None;
        self.seek(self.duration() - self.config.trailing_margin);
    }

    /// Seek to the start.
    pub fn backward_end(&mut self) {
        self.selected_range = None;
        self.seek(0.0);
    }

    fn with_transport_paused<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let was_playing = self.playing;
        if was_playing {
            self.stop();
        }
        let result = f(self);
        if was_playing {
            self.play();
        }
        result
    }

    // ── Structural mutations ─────────────────────────────────────

    /// Apply an edit and record its inverse. Returns false for no-ops.
    fn execute(&mut self, command: EditCommand) -> bool {
        let changes_tracks = command.changes_tracks();
        let inverse = self.with_transport_paused(|timeline| {
            let inverse = command.apply(&mut timeline.tracks);
            if changes_tracks {
                timeline.sync_graph();
            }
            inverse
        });
        match inverse {
            Some(inverse) => {
                self.history.push(inverse);
                self.emit_structure(changes_tracks);
                true
            }
            None => false,
        }
    }

    fn emit_structure(&mut self, changes_tracks: bool) {
        self.emit(if changes_tracks {
            TimelineEvent::TracksChanged
        } else {
            TimelineEvent::ClipsChanged
        });
    }

    /// Reconnect every track player to the engine's mix point.
    fn sync_graph(&mut self) {
        self.engine.detach_all();
        for track in &self.tracks {
            self.engine.attach(track.player().clone());
        }
    }

    /// Next default track name.
    fn next_track_name(&self) -> String {
        format!("Channel # {}", self.tracks.len() + 1)
    }

    /// A fresh track, muted when a solo is active so only soloed tracks
    /// stay audible.
    fn make_track(&self, name: String) -> Track {
        let mut track = Track::new(name);
        track.muted = self.any_solo();
        track
    }

    /// Append a new default-named track. Undoable.
    pub fn add_new_track(&mut self) -> Uuid {
        let track = self.make_track(self.next_track_name());
        self.add_track(track)
    }

    /// Append `track`. Undoable. While a solo is active the new track
    /// arrives muted and unsoloed.
    pub fn add_track(&mut self, mut track: Track) -> Uuid {
        if self.any_solo() {
            track.solo = false;
            track.muted = true;
        }
        let id = track.id;
        let index = self.tracks.len();
        self.execute(EditCommand::AddTrack { track, index });
        id
    }

    /// Remove a track and its clips. Undoable.
    pub fn remove_track(&mut self, track_id: Uuid) -> bool {
        self.execute(EditCommand::RemoveTrack { track_id })
    }

    /// Insert clips onto the tracks they name. Clips for missing tracks
    /// are dropped. Undoable.
    pub fn insert_clips(&mut self, clips: Vec<Clip>) -> bool {
        self.execute(EditCommand::InsertClips { clips })
    }

    /// Remove clips by ID. Undoable.
    pub fn remove_clips(&mut self, clip_ids: Vec<Uuid>) -> bool {
        self.execute(EditCommand::RemoveClips { clip_ids })
    }

    /// Move a clip to another track, keeping its start time. Undoable.
    pub fn move_clip(&mut self, clip_id: Uuid, to_track: Uuid) -> bool {
        self.execute(EditCommand::MoveClip { clip_id, to_track })
    }

    /// Place a clip at `start_time` (clamped to zero). Overlaps with other
    /// clips are allowed and mix additively; see [`overlapping_clips`].
    /// Undoable.
    ///
    /// [`overlapping_clips`]: Self::overlapping_clips
    pub fn set_clip_start(&mut self, clip_id: Uuid, start_time: f64) -> bool {
        let start_time = if start_time.is_finite() { start_time.max(0.0) } else { 0.0 };
        let current = self.clip(clip_id).map(|c| c.start_time);
        if current.map_or(true, |t| t == start_time) {
            return false;
        }
        self.execute(EditCommand::SetClipStart {
            clip_id,
            start_time,
        })
    }

    /// IDs of clips on the same track whose span intersects `clip_id`'s.
    pub fn overlapping_clips(&self, clip_id: Uuid) -> Vec<Uuid> {
        let Some(clip) = self.clip(clip_id) else {
            return Vec::new();
        };
        self.track(clip.track_id)
            .map(|t| {
                t.overlapping(clip.time_range(), clip_id)
                    .map(|c| c.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Undo the last edit.
    pub fn undo(&mut self) -> bool {
        let changes_tracks = self
            .history
            .peek_undo()
            .map_or(false, EditCommand::changes_tracks);
        let done = self.with_transport_paused(|timeline| {
            let done = timeline.history.undo(&mut timeline.tracks);
            if done && changes_tracks {
                timeline.sync_graph();
            }
            done
        });
        if done {
            self.emit_structure(changes_tracks);
        }
        done
    }

    /// Redo the last undone edit.
    pub fn redo(&mut self) -> bool {
        let changes_tracks = self
            .history
            .peek_redo()
            .map_or(false, EditCommand::changes_tracks);
        let done = self.with_transport_paused(|timeline| {
            let done = timeline.history.redo(&mut timeline.tracks);
            if done && changes_tracks {
                timeline.sync_graph();
            }
            done
        });
        if done {
            self.emit_structure(changes_tracks);
        }
        done
    }

    // ── Mute / solo / mix ────────────────────────────────────────

    /// Toggle a track's mute and clear its solo.
    pub fn mute(&mut self, track_id: Uuid) {
        if self.track(track_id).is_none() {
            return;
        }
        self.with_transport_paused(|timeline| {
            if let Some(track) = timeline.track_mut(track_id) {
                track.muted = !track.muted;
                track.solo = false;
            }
        });
        self.emit(TimelineEvent::TracksChanged);
    }

    /// Toggle solo on a track. Turning it on makes it the only soloed
    /// (and therefore only audible) track; turning it off restores every
    /// track's explicit mute.
    pub fn solo(&mut self, track_id: Uuid) {
        let Some(is_on) = self.track(track_id).map(|t| !t.solo) else {
            return;
        };
        self.with_transport_paused(|timeline| {
            for track in &mut timeline.tracks {
                track.solo = false;
            }
            if let Some(track) = timeline.track_mut(track_id) {
                track.solo = is_on;
            }
        });
        self.emit(TimelineEvent::TracksChanged);
    }

    /// Set a track's linear gain. Applies immediately.
    pub fn set_track_volume(&mut self, track_id: Uuid, volume: f32) {
        let Some(track) = self.track_mut(track_id) else {
            return;
        };
        track.volume = volume.max(0.0);
        track.player().lock().channel_mut().volume = track.volume;
        self.emit(TimelineEvent::TracksChanged);
    }

    /// Set a track's pan. Applies immediately.
    pub fn set_track_pan(&mut self, track_id: Uuid, pan: f32) {
        let Some(track) = self.track_mut(track_id) else {
            return;
        };
        track.pan = pan.clamp(-1.0, 1.0);
        track.player().lock().channel_mut().pan = track.pan;
        self.emit(TimelineEvent::TracksChanged);
    }

    pub fn rename_track(&mut self, track_id: Uuid, name: impl Into<String>) {
        if let Some(track) = self.track_mut(track_id) {
            track.name = name.into();
            self.emit(TimelineEvent::TracksChanged);
        }
    }

    // ── Import ───────────────────────────────────────────────────

    /// Mark an import or export as in flight. Each call must be matched
    /// by exactly one finish; the timeline stays processing until every
    /// job has finished.
    pub fn begin_processing(&mut self) {
        self.pending_jobs += 1;
        self.set_state(TimelineState::Processing);
    }

    /// Imports and exports begun but not yet finished.
    pub fn pending_jobs(&self) -> usize {
        self.pending_jobs
    }

    fn end_processing(&mut self) {
        self.pending_jobs = self.pending_jobs.saturating_sub(1);
        if self.pending_jobs == 0 {
            self.set_state(TimelineState::Ready);
        }
    }

    /// Finish a job that never ran.
    pub(crate) fn abort_processing(&mut self, error: TimelineError) {
        self.fail(error);
        self.end_processing();
    }

    /// Finish an import whose decode happened elsewhere. On failure the
    /// track list is untouched and the error is recorded. Either way the
    /// job counts as finished.
    pub fn finish_import(
        &mut self,
        locator: &Path,
        decoded: Result<PcmBuffer>,
        start_time: f64,
        track_id: Option<Uuid>,
    ) -> Option<Uuid> {
        let result = match decoded {
            Ok(buffer) => self.place_imported(locator, buffer, start_time, track_id),
            Err(e) => {
                self.fail(TimelineError::decode(locator, e));
                None
            }
        };
        self.end_processing();
        result
    }

    fn place_imported(
        &mut self,
        locator: &Path,
        buffer: PcmBuffer,
        start_time: f64,
        track_id: Option<Uuid>,
    ) -> Option<Uuid> {
        let compression = self.config.envelope_compression;
        let target = track_id.filter(|id| self.track(*id).is_some());

        let (clip_id, command) = match target {
            Some(track_id) => {
                let clip = Clip::new(locator, buffer, track_id, start_time, compression);
                (clip.id, EditCommand::InsertClips { clips: vec![clip] })
            }
            None => {
                if let Some(missing) = track_id {
                    warn!("Import target track {} not found, creating a new track", missing);
                }
                let track = self.make_track(self.next_track_name());
                let clip = Clip::new(locator, buffer, track.id, start_time, compression);
                let clip_id = clip.id;
                let index = self.tracks.len();
                (
                    clip_id,
                    EditCommand::Batch(vec![
                        EditCommand::AddTrack { track, index },
                        EditCommand::InsertClips { clips: vec![clip] },
                    ]),
                )
            }
        };

        self.execute(command).then(|| {
            info!("Imported {} as clip {}", locator.display(), clip_id);
            clip_id
        })
    }

    /// Decode `locator` and place it at `start_time`, on `track_id` or on
    /// a new track.
    pub fn import_file(
        &mut self,
        locator: &Path,
        start_time: f64,
        track_id: Option<Uuid>,
        decoder: &dyn AudioDecoder,
    ) -> Option<Uuid> {
        self.begin_processing();
        let decoded = decoder.decode(locator);
        self.finish_import(locator, decoded, start_time, track_id)
    }

    // ── Selection & clipboard ────────────────────────────────────

    /// Select a clip; without `additive` every other clip is deselected.
    pub fn select_clip(&mut self, clip_id: Uuid, additive: bool) {
        for track in &mut self.tracks {
            for clip in track.clips_mut() {
                if clip.id == clip_id {
                    clip.selected = true;
                } else if !additive {
                    clip.selected = false;
                }
            }
        }
        self.emit(TimelineEvent::SelectionChanged);
    }

    pub fn select_all(&mut self) {
        self.set_all_selected(true);
    }

    pub fn deselect_all(&mut self) {
        self.set_all_selected(false);
    }

    fn set_all_selected(&mut self, selected: bool) {
        for track in &mut self.tracks {
            for clip in track.clips_mut() {
                clip.selected = selected;
            }
        }
        self.emit(TimelineEvent::SelectionChanged);
    }

    pub fn selected_clips(&self) -> Vec<&Clip> {
        self.clips().filter(|c| c.selected).collect()
    }

    /// Put the selected clips on the clipboard. Returns how many.
    pub fn copy(&mut self) -> usize {
        let payload = ClipboardPayload {
            clips: self.selected_clips().iter().map(|c| c.record()).collect(),
        };
        if payload.clips.is_empty() {
            return 0;
        }
        match payload.to_bytes() {
            Ok(bytes) => {
                self.clipboard.write(bytes);
                debug!("Copied {} clips", payload.clips.len());
                payload.clips.len()
            }
            Err(e) => {
                self.fail(TimelineError::Clipboard(e.to_string()));
                0
            }
        }
    }

    /// Copy then delete the selected clips.
    pub fn cut(&mut self) -> usize {
        let copied = self.copy();
        if copied > 0 {
            self.delete();
        }
        copied
    }

    /// Remove the selected clips. Undoable.
    pub fn delete(&mut self) -> bool {
        let ids: Vec<Uuid> = self.selected_clips().iter().map(|c| c.id).collect();
        if ids.is_empty() {
            return false;
        }
        self.remove_clips(ids)
    }

    /// Paste clipboard clips as new, independent clips decoded afresh.
    /// Returns the new clip IDs. Undoable as one step.
    pub fn paste(&mut self, decoder: &dyn AudioDecoder) -> Vec<Uuid> {
        let Some(bytes) = self.clipboard.read() else {
            return Vec::new();
        };
        let payload = match ClipboardPayload::from_bytes(&bytes) {
            Ok(payload) => payload,
            Err(e) => {
                self.fail(TimelineError::Clipboard(e.to_string()));
                return Vec::new();
            }
        };

        let compression = self.config.envelope_compression;
        let mut clips = Vec::with_capacity(payload.clips.len());
        for record in &payload.clips {
            match decoder.decode(&record.locator) {
                Ok(buffer) => clips.push(Clip::new(
                    record.locator.clone(),
                    buffer,
                    record.track_id,
                    record.start_time,
                    compression,
                )),
                Err(e) => self.fail(TimelineError::decode(&record.locator, e)),
            }
        }

        let ids: Vec<Uuid> = clips
            .iter()
            .filter(|c| self.track(c.track_id).is_some())
            .map(|c| c.id)
            .collect();
        if !self.insert_clips(clips) {
            return Vec::new();
        }
        ids
    }

    // ── Export ───────────────────────────────────────────────────

    /// Export settings derived from the live mix format.
    pub fn export_settings(&self, path: impl Into<PathBuf>, codec: AudioCodec) -> ExportSettings {
        ExportSettings::from_mix_format(path, self.engine.output_format(), codec)
    }

    /// Mix the timeline down to `settings.path`. Returns the frame count
    /// written, or `None` with the failure recorded.
    pub fn export(
        &mut self,
        settings: &ExportSettings,
        progress: impl FnMut(ExportProgress),
    ) -> Option<u64> {
        self.begin_processing();
        self.run_export(settings, progress)
    }

    /// Export for a job whose processing was already begun.
    pub(crate) fn run_export(
        &mut self,
        settings: &ExportSettings,
        progress: impl FnMut(ExportProgress),
    ) -> Option<u64> {
        let result = open_sink(settings).and_then(|mut sink| {
            self.render_to(sink.as_mut(), settings, progress)
        });
        self.finish_export(result)
    }

    /// Mix the timeline down into an already opened sink.
    pub fn export_to_sink(
        &mut self,
        sink: &mut dyn ExportSink,
        settings: &ExportSettings,
        progress: impl FnMut(ExportProgress),
    ) -> Option<u64> {
        self.begin_processing();
        let result = self.render_to(sink, settings, progress);
        self.finish_export(result)
    }

    fn render_to(
        &mut self,
        sink: &mut dyn ExportSink,
        settings: &ExportSettings,
        progress: impl FnMut(ExportProgress),
    ) -> Result<u64> {
        self.stop();
        let renderer = OfflineRenderer::new(self.config.max_render_frames);
        let frames = renderer.render(self, settings.render_format(), sink, progress)?;
        sink.finish()?;
        Ok(frames)
    }

    fn finish_export(&mut self, result: Result<u64>) -> Option<u64> {
        let frames = match result {
            Ok(frames) => {
                info!("Export finished: {} frames", frames);
                Some(frames)
            }
            Err(e) => {
                self.fail(TimelineError::Export(e.to_string()));
                None
            }
        };
        self.end_processing();
        frames
    }

    /// Engine access for the offline renderer.
    pub(crate) fn engine_mut(&mut self) -> &mut AudioEngine {
        &mut self.engine
    }

    // ── Persistence ──────────────────────────────────────────────

    /// Snapshot the tracks as a persistable document.
    pub fn to_document(&self) -> DocumentFile {
        DocumentFile::new(
            self.tracks
                .iter()
                .map(|t| TrackRecord {
                    id: t.id,
                    name: t.name.clone(),
                    muted: t.muted,
                    solo: t.solo,
                    volume: t.volume,
                    pan: t.pan,
                    clips: t.clips().iter().map(Clip::record).collect(),
                })
                .collect(),
        )
    }

    /// Replace the timeline's contents with `document`, re-decoding every
    /// clip. Clips that fail to decode are skipped and reported; the last
    /// failure is kept in [`last_error`](Self::last_error). Clears undo
    /// history and rewinds the transport.
    pub fn load_document(
        &mut self,
        document: &DocumentFile,
        decoder: &dyn AudioDecoder,
    ) -> Vec<TimelineError> {
        self.stop();
        let compression = self.config.envelope_compression;
        let mut errors = Vec::new();
        let mut tracks = Vec::with_capacity(document.tracks.len());
        let mut soloed = false;

        for record in &document.tracks {
            let mut track = Track::with_id(record.id, record.name.clone());
            track.muted = record.muted;
            track.solo = record.solo && !soloed;
            if record.solo && soloed {
                warn!("Track '{}' is soloed alongside another, clearing its solo", record.name);
            }
            soloed |= record.solo;
            track.volume = record.volume;
            track.pan = record.pan;
            for clip in &record.clips {
                match decoder.decode(&clip.locator) {
                    Ok(buffer) => track.add_clip(Clip::from_record(clip, buffer, compression)),
                    Err(e) => errors.push(TimelineError::decode(&clip.locator, e)),
                }
            }
            tracks.push(track);
        }

        self.tracks = tracks;
        self.history.clear();
        self.clock.publish(0.0);
        self.sync_graph();
        info!(
            "Loaded document: {} tracks, {} clips, {} failed",
            self.tracks.len(),
            self.clips().count(),
            errors.len()
        );
        for error in &errors {
            self.fail(error.clone());
        }
        self.emit(TimelineEvent::TracksChanged);
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackdeck_media::MemoryDecoder;

    fn config() -> EngineConfig {
        EngineConfig {
            output_sample_rate: 1000,
            envelope_compression: 10,
            ..Default::default()
        }
    }

    fn decoder() -> MemoryDecoder {
        let decoder = MemoryDecoder::new();
        decoder.insert("five.wav", PcmBuffer::from_planar_f32(1000, vec![vec![0.5; 5000]]));
        decoder.insert("two.wav", PcmBuffer::from_planar_f32(1000, vec![vec![0.25; 2000]]));
        decoder
    }

    #[test]
    fn test_duration_includes_margin() {
        let mut timeline = Timeline::headless(config());
        assert_eq!(timeline.duration(), 60.0);
        timeline
            .import_file(Path::new("five.wav"), 10.0, None, &decoder())
            .unwrap();
        assert_eq!(timeline.duration(), 75.0);
    }

    #[test]
    fn test_import_creates_named_track() {
        let mut timeline = Timeline::headless(config());
        let decoder = decoder();
        let clip = timeline
            .import_file(Path::new("five.wav"), 0.0, None, &decoder)
            .unwrap();
        timeline.import_file(Path::new("two.wav"), 0.0, None, &decoder);

        assert_eq!(timeline.tracks().len(), 2);
        assert_eq!(timeline.tracks()[0].name, "Channel # 1");
        assert_eq!(timeline.tracks()[1].name, "Channel # 2");
        assert_eq!(timeline.clip(clip).unwrap().name, "five.wav");
        assert_eq!(timeline.state(), TimelineState::Ready);
        assert_eq!(timeline.engine().output_format().sample_rate, 1000);
    }

    #[test]
    fn test_import_onto_existing_track() {
        let mut timeline = Timeline::headless(config());
        let track = timeline.add_new_track();
        let clip = timeline
            .import_file(Path::new("two.wav"), 3.0, Some(track), &decoder())
            .unwrap();
        assert_eq!(timeline.tracks().len(), 1);
        assert_eq!(timeline.clip(clip).unwrap().track_id, track);
    }

    #[test]
    fn test_failed_import_records_error() {
        let mut timeline = Timeline::headless(config());
        let events = timeline.subscribe();
        assert!(timeline
            .import_file(Path::new("missing.wav"), 0.0, None, &decoder())
            .is_none());
        assert!(timeline.tracks().is_empty());
        assert_eq!(timeline.state(), TimelineState::Ready);
        assert!(matches!(
            timeline.last_error(),
            Some(TimelineError::Decode { .. })
        ));
        let received: Vec<_> = events.try_iter().collect();
        assert!(received.iter().any(|e| matches!(e, TimelineEvent::Error(_))));
        assert_eq!(
            received.last(),
            Some(&TimelineEvent::StateChanged(TimelineState::Ready))
        );
    }

    #[test]
    fn test_processing_waits_for_every_job() {
        let mut timeline = Timeline::headless(config());
        let decoder = decoder();
        timeline.begin_processing();
        timeline.begin_processing();
        assert_eq!(timeline.pending_jobs(), 2);

        let first = decoder.decode(Path::new("two.wav"));
        timeline.finish_import(Path::new("two.wav"), first, 0.0, None);
        assert_eq!(timeline.state(), TimelineState::Processing);

        let second = decoder.decode(Path::new("missing.wav"));
        timeline.finish_import(Path::new("missing.wav"), second, 0.0, None);
        assert_eq!(timeline.state(), TimelineState::Ready);
        assert_eq!(timeline.pending_jobs(), 0);
    }

    #[test]
    fn test_seek_clamps() {
        let mut timeline = Timeline::headless(config());
        timeline.seek(-5.0);
        assert_eq!(timeline.current_time(), 0.0);
        timeline.seek(1_000.0);
        assert_eq!(timeline.current_time(), 60.0);
    }

    #[test]
    fn test_transport_nudges() {
        let mut timeline = Timeline::headless(config());
        timeline.import_file(Path::new("five.wav"), 30.0, None, &decoder());
        timeline.set_selected_range(Some(TimeRange::new(1.0, 2.0)));

        timeline.forward();
        assert_eq!(timeline.current_time(), 15.0);
        assert!(timeline.selected_range().is_none());
        timeline.forward_end();
        assert_eq!(timeline.current_time(), 35.0);
        timeline.backward();
        assert_eq!(timeline.current_time(), 20.0);
        timeline.backward_end();
        assert_eq!(timeline.current_time(), 0.0);
    }

    #[test]
    fn test_play_toggles() {
        let mut timeline = Timeline::headless(config());
        timeline.import_file(Path::new("five.wav"), 0.0, None, &decoder());
        timeline.play();
        assert!(timeline.is_playing());
        assert!(timeline.engine().is_running());
        timeline.play();
        assert!(!timeline.is_playing());
        assert!(!timeline.engine().is_running());
    }

    #[test]
    fn test_solo_and_mute() {
        let mut timeline = Timeline::headless(config());
        let a = timeline.add_new_track();
        let b = timeline.add_new_track();
        let c = timeline.add_new_track();
        timeline.mute(c);

        timeline.solo(a);
        assert_eq!(timeline.is_track_muted(a), Some(false));
        assert_eq!(timeline.is_track_muted(b), Some(true));
        assert_eq!(timeline.is_track_muted(c), Some(true));

        // New tracks join muted while a solo is active.
        let d = timeline.add_new_track();
        assert!(timeline.track(d).unwrap().muted);

        timeline.solo(a);
        assert_eq!(timeline.is_track_muted(a), Some(false));
        assert_eq!(timeline.is_track_muted(b), Some(false));
        assert_eq!(timeline.is_track_muted(c), Some(true));

        timeline.solo(b);
        timeline.mute(b);
        assert!(!timeline.track(b).unwrap().solo);
        assert!(timeline.track(b).unwrap().muted);
        assert!(!timeline.any_solo());
    }

    #[test]
    fn test_added_soloed_track_yields_to_active_solo() {
        let mut timeline = Timeline::headless(config());
        let a = timeline.add_new_track();
        timeline.solo(a);

        let mut incoming = Track::new("Soloed");
        incoming.solo = true;
        let b = timeline.add_track(incoming);

        assert_eq!(timeline.tracks().iter().filter(|t| t.solo).count(), 1);
        assert_eq!(timeline.is_track_muted(a), Some(false));
        assert_eq!(timeline.is_track_muted(b), Some(true));
        assert!(timeline.track(b).unwrap().muted);
    }

    #[test]
    fn test_load_keeps_first_solo_only() {
        let mut timeline = Timeline::headless(config());
        let a = timeline.add_new_track();
        let b = timeline.add_new_track();
        let c = timeline.add_new_track();

        let mut doc = timeline.to_document();
        doc.tracks[1].solo = true;
        doc.tracks[2].solo = true;

        let mut restored = Timeline::headless(config());
        assert!(restored.load_document(&doc, &decoder()).is_empty());
        assert!(!restored.track(a).unwrap().solo);
        assert!(restored.track(b).unwrap().solo);
        assert!(!restored.track(c).unwrap().solo);
        assert_eq!(restored.is_track_muted(a), Some(true));
        assert_eq!(restored.is_track_muted(b), Some(false));
        assert_eq!(restored.is_track_muted(c), Some(true));
    }

    #[test]
    fn test_move_and_undo() {
        let mut timeline = Timeline::headless(config());
        let decoder = decoder();
        let clip = timeline
            .import_file(Path::new("two.wav"), 1.0, None, &decoder)
            .unwrap();
        let from = timeline.clip(clip).unwrap().track_id;
        let to = timeline.add_new_track();

        assert!(timeline.move_clip(clip, to));
        assert_eq!(timeline.clip(clip).unwrap().track_id, to);
        assert!(timeline.undo());
        assert_eq!(timeline.clip(clip).unwrap().track_id, from);
        assert!(timeline.redo());
        assert_eq!(timeline.clip(clip).unwrap().track_id, to);
    }

    #[test]
    fn test_import_undo_removes_track() {
        let mut timeline = Timeline::headless(config());
        timeline.import_file(Path::new("two.wav"), 0.0, None, &decoder());
        assert_eq!(timeline.tracks().len(), 1);
        assert!(timeline.undo());
        assert!(timeline.tracks().is_empty());
        assert!(timeline.redo());
        assert_eq!(timeline.tracks().len(), 1);
        assert_eq!(timeline.clips().count(), 1);
    }

    #[test]
    fn test_set_clip_start_clamps_and_reports_overlap() {
        let mut timeline = Timeline::headless(config());
        let decoder = decoder();
        let a = timeline
            .import_file(Path::new("five.wav"), 0.0, None, &decoder)
            .unwrap();
        let track = timeline.clip(a).unwrap().track_id;
        let b = timeline
            .import_file(Path::new("two.wav"), 10.0, Some(track), &decoder)
            .unwrap();

        assert!(timeline.set_clip_start(b, -3.0));
        assert_eq!(timeline.clip(b).unwrap().start_time, 0.0);
        assert_eq!(timeline.overlapping_clips(b), vec![a]);
        assert!(!timeline.set_clip_start(b, 0.0));

        assert!(timeline.undo());
        assert_eq!(timeline.clip(b).unwrap().start_time, 10.0);
        assert!(timeline.overlapping_clips(b).is_empty());
    }

    #[test]
    fn test_copy_paste_creates_independent_clips() {
        let mut timeline = Timeline::headless(config());
        let decoder = decoder();
        let original = timeline
            .import_file(Path::new("five.wav"), 2.0, None, &decoder)
            .unwrap();

        timeline.select_clip(original, false);
        assert_eq!(timeline.copy(), 1);
        let pasted = timeline.paste(&decoder);
        assert_eq!(pasted.len(), 1);
        assert_ne!(pasted[0], original);

        let copy = timeline.clip(pasted[0]).unwrap();
        assert_eq!(copy.start_time, 2.0);
        let source = timeline.clip(original).unwrap();
        assert!(!std::sync::Arc::ptr_eq(copy.buffer(), source.buffer()));

        assert!(timeline.undo());
        assert!(timeline.clip(pasted[0]).is_none());
    }

    #[test]
    fn test_cut_and_delete() {
        let mut timeline = Timeline::headless(config());
        let decoder = decoder();
        let a = timeline
            .import_file(Path::new("five.wav"), 0.0, None, &decoder)
            .unwrap();
        let track = timeline.clip(a).unwrap().track_id;
        let b = timeline
            .import_file(Path::new("two.wav"), 6.0, Some(track), &decoder)
            .unwrap();

        timeline.select_clip(a, false);
        assert_eq!(timeline.cut(), 1);
        assert!(timeline.clip(a).is_none());

        timeline.select_clip(b, false);
        assert!(timeline.delete());
        assert!(timeline.is_empty());

        let restored = timeline.paste(&decoder);
        assert_eq!(restored.len(), 1);
        assert_eq!(timeline.clip(restored[0]).unwrap().name, "five.wav");
    }

    #[test]
    fn test_revision_and_events() {
        let mut timeline = Timeline::headless(config());
        let events = timeline.subscribe();
        let before = timeline.revision();
        timeline.add_new_track();
        assert!(timeline.revision() > before);
        assert_eq!(events.try_recv().unwrap(), TimelineEvent::TracksChanged);
    }

    #[test]
    fn test_document_snapshot() {
        let mut timeline = Timeline::headless(config());
        let decoder = decoder();
        timeline.import_file(Path::new("five.wav"), 1.5, None, &decoder);
        let track = timeline.tracks()[0].id;
        timeline.set_track_volume(track, 0.5);

        let doc = timeline.to_document();
        let mut restored = Timeline::headless(config());
        assert!(restored.load_document(&doc, &decoder).is_empty());
        assert_eq!(restored.tracks()[0].id, track);
        assert_eq!(restored.tracks()[0].volume, 0.5);
        assert_eq!(restored.duration(), timeline.duration());
        assert!(!restored.history().can_undo());
    }
}
