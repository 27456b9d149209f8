//! Expiry markers and the sweep that deletes expired workspaces.
//!
//! The marker file is the only input to the sweep, so cleanup works the same
//! after a restart when the in-memory task table is empty. Directories
//! without a marker are never touched.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info};
use walkdir::WalkDir;

use crate::error::StorageError;
use crate::storage::workspace::{remove_path, WorkspaceStore};

/// Name of the marker file holding the expiry instant as epoch seconds.
pub const EXPIRY_MARKER: &str = "expires_at";

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SweepReport {
    pub removed: Vec<PathBuf>,
}

impl SweepReport {
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }
}

/// Epoch seconds with sub-second precision.
pub fn epoch_seconds(instant: DateTime<Utc>) -> f64 {
    instant.timestamp() as f64 + f64::from(instant.timestamp_subsec_micros()) / 1_000_000.0
}

/// Reads the marker inside `dir`. `None` for a missing or unparsable marker.
pub fn read_expiry(dir: &Path) -> Option<f64> {
    let content = std::fs::read_to_string(dir.join(EXPIRY_MARKER)).ok()?;
    content.trim().parse::<f64>().ok()
}

fn is_expired(dir: &Path, now: f64) -> bool {
    read_expiry(dir).is_some_and(|expires| expires < now)
}

impl WorkspaceStore {
    /// Writes the expiry marker into `workspace`.
    ///
    /// The value is written to a temporary file and renamed into place, so a
    /// concurrent sweep never reads a partial number.
    pub fn mark_expiry(
        &self,
        workspace: &Path,
        expires_at: DateTime<Utc>,
    ) -> Result<PathBuf, StorageError> {
        let target = workspace.join(EXPIRY_MARKER);
        let write_err = |e: std::io::Error| StorageError::WriteFile {
            path: target.clone(),
            source: e,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(workspace).map_err(write_err)?;
        write!(tmp, "{}", epoch_seconds(expires_at)).map_err(write_err)?;
        tmp.persist(&target).map_err(|e| write_err(e.error))?;

        Ok(target)
    }

    /// Deletes every workspace whose marker lies before `now`.
    ///
    /// Looks at top-level directories and one level of owner subdirectories.
    /// An owner directory emptied by this sweep is removed as well. Missing
    /// roots, entries deleted concurrently and unreadable directories are
    /// skipped silently.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        if !self.result_dir().is_dir() {
            return report;
        }

        let now = epoch_seconds(now);
        let mut emptied_parents = BTreeSet::new();

        let mut walker = WalkDir::new(self.result_dir())
            .min_depth(1)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping entry during sweep: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_dir() || !is_expired(entry.path(), now) {
                continue;
            }

            remove_path(entry.path());
            info!("Removed expired workspace {}", entry.path().display());
            report.removed.push(entry.path().to_path_buf());

            if entry.depth() == 1 {
                walker.skip_current_dir();
            } else if let Some(parent) = entry.path().parent() {
                emptied_parents.insert(parent.to_path_buf());
            }
        }

        for parent in emptied_parents {
            // remove_dir refuses non-empty directories.
            if std::fs::remove_dir(&parent).is_ok() {
                debug!("Removed empty owner directory {}", parent.display());
            }
        }

        report
    }
}
