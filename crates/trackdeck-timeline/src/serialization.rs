//! Document serialization with versioning and migration.
//!
//! Documents persist each clip's source locator and placement, never its
//! samples; loading re-decodes every source. JSON carries a schema version
//! for forward-compatible persistence.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use trackdeck_core::{Result, TrackdeckError};
use uuid::Uuid;

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Persisted clip: the stable field set shared with the clipboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRecord {
    pub id: Uuid,
    pub track_id: Uuid,
    pub locator: PathBuf,
    pub start_time: f64,
}

/// Persisted track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default = "unity")]
    pub volume: f32,
    #[serde(default)]
    pub pan: f32,
    #[serde(default)]
    pub clips: Vec<ClipRecord>,
}

fn unity() -> f32 {
    1.0
}

/// Versioned document wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentFile {
    /// Schema version for migration.
    pub version: u32,
    /// Application version that wrote this file.
    pub app_version: String,
    /// Tracks in display order.
    pub tracks: Vec<TrackRecord>,
}

impl DocumentFile {
    pub fn new(tracks: Vec<TrackRecord>) -> Self {
        Self {
            version: CURRENT_VERSION,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            tracks,
        }
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| {
            TrackdeckError::Serialization(format!("Failed to serialize document: {}", e))
        })
    }

    /// Deserialize from JSON bytes, applying migrations if needed.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_slice(data)
            .map_err(|e| TrackdeckError::Serialization(format!("Invalid JSON: {}", e)))?;

        let version = raw.get("version").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        if version > CURRENT_VERSION {
            return Err(TrackdeckError::Serialization(format!(
                "Document version {} is newer than supported version {}",
                version, CURRENT_VERSION
            )));
        }

        let migrated = migrate(raw, version)?;
        serde_json::from_value(migrated)
            .map_err(|e| TrackdeckError::Serialization(format!("Failed to parse document: {}", e)))
    }

    /// Save the document to a file path.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        let data = self.to_json()?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Load a document from a file path.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_json(&data)
    }

    /// Number of clips across all tracks.
    pub fn clip_count(&self) -> usize {
        self.tracks.iter().map(|t| t.clips.len()).sum()
    }
}

/// Apply sequential migrations from `from_version` to CURRENT_VERSION.
fn migrate(mut data: serde_json::Value, from_version: u32) -> Result<serde_json::Value> {
    let mut version = from_version;

    while version < CURRENT_VERSION {
        match version {
            0 => {
                // v0 → v1: the file was a bare track list
                if data.is_array() {
                    data = serde_json::json!({
                        "version": 1,
                        "app_version": "0.0.0",
                        "tracks": data,
                    });
                } else if let Some(obj) = data.as_object_mut() {
                    obj.insert("version".into(), serde_json::json!(1));
                    obj.entry("app_version")
                        .or_insert_with(|| serde_json::json!("0.0.0"));
                }
                version = 1;
            }
            _ => {
                return Err(TrackdeckError::Serialization(format!(
                    "No migration path from version {}",
                    version
                )));
            }
        }
    }

    Ok(data)
}
