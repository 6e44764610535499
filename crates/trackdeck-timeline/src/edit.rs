//! Edit operations with undo/redo support.
//!
//! Uses the Command pattern: applying an `EditCommand` mutates the track
//! list and returns the exact inverse command. The undo stack stores those
//! inverses, so clips and tracks are moved in and out of history rather
//! than copied.

use tracing::warn;
use uuid::Uuid;

use crate::clip::Clip;
use crate::track::Track;

/// A reversible structural mutation.
#[derive(Debug)]
pub enum EditCommand {
    /// Insert a track at `index` (clamped to the list length).
    AddTrack { track: Track, index: usize },
    /// Remove a track and all of its clips.
    RemoveTrack { track_id: Uuid },
    /// Append each clip to the track named by its `track_id`. Clips whose
    /// track no longer exists are dropped.
    InsertClips { clips: Vec<Clip> },
    /// Remove clips wherever they are.
    RemoveClips { clip_ids: Vec<Uuid> },
    /// Reassign a clip to another track.
    MoveClip { clip_id: Uuid, to_track: Uuid },
    /// Change a clip's timeline start.
    SetClipStart { clip_id: Uuid, start_time: f64 },
    /// Several commands applied in order as one step.
    Batch(Vec<EditCommand>),
}

impl EditCommand {
    /// Apply to `tracks` and return the inverse, or `None` when the
    /// command turned out to be a no-op.
    pub fn apply(self, tracks: &mut Vec<Track>) -> Option<EditCommand> {
        match self {
            Self::AddTrack { mut track, index } => {
                if track.solo && tracks.iter().any(|t| t.solo) {
                    track.solo = false;
                    track.muted = true;
                }
                let track_id = track.id;
                let index = index.min(tracks.len());
                tracks.insert(index, track);
                Some(Self::RemoveTrack { track_id })
            }
            Self::RemoveTrack { track_id } => {
                let index = tracks.iter().position(|t| t.id == track_id)?;
                let track = tracks.remove(index);
                Some(Self::AddTrack { track, index })
            }
            Self::InsertClips { clips } => {
                let mut inserted = Vec::with_capacity(clips.len());
                for clip in clips {
                    match tracks.iter_mut().find(|t| t.id == clip.track_id) {
                        Some(track) => {
                            inserted.push(clip.id);
                            track.add_clip(clip);
                        }
                        None => warn!(
                            "Dropping clip '{}': track {} no longer exists",
                            clip.name, clip.track_id
                        ),
                    }
                }
                (!inserted.is_empty()).then_some(Self::RemoveClips { clip_ids: inserted })
            }
            Self::RemoveClips { clip_ids } => {
                let mut removed = Vec::with_capacity(clip_ids.len());
                for id in clip_ids {
                    if let Some(clip) = tracks.iter_mut().find_map(|t| t.remove_clip(id)) {
                        removed.push(clip);
                    }
                }
                (!removed.is_empty()).then_some(Self::InsertClips { clips: removed })
            }
            Self::MoveClip { clip_id, to_track } => {
                if !tracks.iter().any(|t| t.id == to_track) {
                    return None;
                }
                let from = find_clip_track(tracks, clip_id)?;
                if from == to_track {
                    return None;
                }
                let clip = find_track_mut(tracks, from)?.remove_clip(clip_id)?;
                find_track_mut(tracks, to_track)?.add_clip(clip);
                Some(Self::MoveClip {
                    clip_id,
                    to_track: from,
                })
            }
            Self::SetClipStart {
                clip_id,
                start_time,
            } => {
                let clip = tracks.iter_mut().find_map(|t| t.clip_mut(clip_id))?;
                let previous = clip.start_time;
                clip.start_time = start_time;
                Some(Self::SetClipStart {
                    clip_id,
                    start_time: previous,
                })
            }
            Self::Batch(commands) => {
                let mut inverses: Vec<EditCommand> =
                    commands.into_iter().filter_map(|c| c.apply(tracks)).collect();
                if inverses.is_empty() {
                    return None;
                }
                inverses.reverse();
                Some(Self::Batch(inverses))
            }
        }
    }

    /// Whether applying this command adds or removes tracks.
    pub fn changes_tracks(&self) -> bool {
        match self {
            Self::AddTrack { .. } | Self::RemoveTrack { .. } => true,
            Self::Batch(commands) => commands.iter().any(Self::changes_tracks),
            _ => false,
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn find_track_mut(tracks: &mut [Track], track_id: Uuid) -> Option<&mut Track> {
    tracks.iter_mut().find(|t| t.id == track_id)
}

fn find_clip_track(tracks: &[Track], clip_id: Uuid) -> Option<Uuid> {
    tracks
        .iter()
        .find(|t| t.clip(clip_id).is_some())
        .map(|t| t.id)
}

// ── Undo stack ──────────────────────────────────────────────────

/// Undo/redo history of inverse commands.
#[derive(Debug)]
pub struct UndoStack {
    /// Inverses of executed commands (most recent last).
    undo: Vec<EditCommand>,
    /// Inverses of undone commands (most recent last).
    redo: Vec<EditCommand>,
    /// Maximum history depth.
    max_depth: usize,
}

impl UndoStack {
    /// Create a new undo stack with the given maximum depth.
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            max_depth,
        }
    }

    /// Record the inverse of a freshly executed command.
    /// Clears the redo stack (new action invalidates redo history).
    pub fn push(&mut self, inverse: EditCommand) {
        self.redo.clear();
        self.push_undo(inverse);
    }

    fn push_undo(&mut self, inverse: EditCommand) {
        self.undo.push(inverse);
        if self.undo.len() > self.max_depth {
            self.undo.remove(0);
        }
    }

    /// Undo the most recent command against `tracks`. Returns false when
    /// there was nothing to undo.
    pub fn undo(&mut self, tracks: &mut Vec<Track>) -> bool {
        let Some(inverse) = self.undo.pop() else {
            return false;
        };
        if let Some(redo) = inverse.apply(tracks) {
            self.redo.push(redo);
        }
        true
    }

    /// Redo the most recently undone command against `tracks`.
    pub fn redo(&mut self, tracks: &mut Vec<Track>) -> bool {
        let Some(command) = self.redo.pop() else {
            return false;
        };
        if let Some(inverse) = command.apply(tracks) {
            self.push_undo(inverse);
        }
        true
    }

    /// Command the next undo would apply.
    pub fn peek_undo(&self) -> Option<&EditCommand> {
        self.undo.last()
    }

    pub fn peek_redo(&self) -> Option<&EditCommand> {
        self.redo.last()
    }

    /// Check if undo is available.
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Check if redo is available.
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Clear all history.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    /// Number of undo steps available.
    pub fn undo_count(&self) -> usize {
        self.undo.len()
    }

    /// Number of redo steps available.
    pub fn redo_count(&self) -> usize {
        self.redo.len()
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(200)
    }
}

// ── Tests ───────────────────────────────────────────────────────
