use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

pub const METADATA_FILE: &str = "metadata.json";

/// Descriptor written next to a finished workspace's pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceMetadata {
    pub source: String,
    pub pages: usize,
    pub dpi: u32,
    pub background: String,
    /// RFC 3339 timestamp.
    pub generated_at: String,
    /// Archive file name, relative to the workspace.
    pub zip_path: String,
    pub original_snapshot: Option<String>,
}

pub fn write_metadata(workspace: &Path, metadata: &WorkspaceMetadata) -> Result<(), StorageError> {
    let path = workspace.join(METADATA_FILE);
    let json = serde_json::to_string_pretty(metadata)?;
    std::fs::write(&path, json).map_err(|e| StorageError::WriteFile { path, source: e })
}

pub fn read_metadata(workspace: &Path) -> Option<WorkspaceMetadata> {
    let content = std::fs::read_to_string(workspace.join(METADATA_FILE)).ok()?;
    serde_json::from_str(&content).ok()
}
