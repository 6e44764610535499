//! Clipboard transfer of clips.
//!
//! Clips travel as a small JSON payload of [`ClipRecord`]s. Pasting
//! re-decodes each source, so pasted clips never share samples with the
//! originals.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use trackdeck_core::{Result, TrackdeckError};

use crate::serialization::ClipRecord;

/// Bytes placed on the clipboard by copy and cut.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClipboardPayload {
    pub clips: Vec<ClipRecord>,
}

impl ClipboardPayload {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            TrackdeckError::Serialization(format!("Failed to serialize clipboard: {}", e))
        })
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| TrackdeckError::Serialization(format!("Invalid clipboard data: {}", e)))
    }
}

/// A system pasteboard or stand-in.
pub trait Clipboard: Send {
    /// Replace the clipboard contents.
    fn write(&mut self, data: Vec<u8>);

    /// Current contents, if any.
    fn read(&self) -> Option<Vec<u8>>;
}

/// In-process clipboard. Clones share contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    contents: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clipboard for MemoryClipboard {
    fn write(&mut self, data: Vec<u8>) {
        *self.contents.lock() = Some(data);
    }

    fn read(&self) -> Option<Vec<u8>> {
        self.contents.lock().clone()
    }
}
