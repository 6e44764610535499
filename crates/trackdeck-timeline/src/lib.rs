//! Trackdeck Timeline - Timeline data model and mixdown
//!
//! Implements the multi-track timeline:
//! - Tracks containing clips, and per-track playback scheduling
//! - Transport, mute/solo and structural edits with undo/redo
//! - Offline mixdown through manual rendering
//! - Versioned document persistence and clipboard payloads
//! - A serial work queue for imports and exports

pub mod clip;
pub mod clipboard;
pub mod document;
pub mod edit;
pub mod render;
pub mod serialization;
pub mod timeline;
pub mod track;

pub use clip::Clip;
pub use clipboard::{Clipboard, ClipboardPayload, MemoryClipboard};
pub use document::{Document, ExportJob, SharedTimeline, WorkQueue};
pub use edit::{EditCommand, UndoStack};
pub use render::OfflineRenderer;
pub use serialization::{ClipRecord, DocumentFile, TrackRecord, CURRENT_VERSION};
pub use timeline::{Timeline, TimelineError, TimelineEvent, TimelineState};
pub use track::{SchedulePlan, Track};
