use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::StorageError;
use crate::sanitize;

/// Best-effort recursive delete. A missing path is not an error; other
/// failures are logged and swallowed.
pub fn remove_path(path: &Path) {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => return,
        Err(e) => {
            warn!("Cannot stat '{}' for removal: {}", path.display(), e);
            return;
        }
    };

    let result = if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };

    match result {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove '{}': {}", path.display(), e),
    }
}

/// Per-task result directories under a single results root.
#[derive(Debug, Clone)]
pub struct WorkspaceStore {
    result_dir: PathBuf,
}

impl WorkspaceStore {
    pub fn new<P: AsRef<Path>>(result_dir: P) -> Self {
        Self {
            result_dir: result_dir.as_ref().to_path_buf(),
        }
    }

    pub fn result_dir(&self) -> &Path {
        &self.result_dir
    }

    /// Creates the workspace directory for a task.
    ///
    /// The directory is named after the slugified stem of `source_name`,
    /// optionally nested under a slugified `owner_segment`. When that name is
    /// taken, the first eight characters of `task_id` are appended. The
    /// primary name is claimed with a non-recursive `create_dir`, so two
    /// concurrent calls can never both receive it.
    pub fn create_workspace(
        &self,
        task_id: &str,
        source_name: &str,
        owner_segment: Option<&str>,
    ) -> Result<PathBuf, StorageError> {
        let stem = Path::new(source_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(source_name);
        let slug = sanitize::slugify(stem);

        let mut parent = self.result_dir.clone();
        if let Some(owner) = owner_segment {
            parent.push(sanitize::slugify(owner));
        }

        let primary = parent.join(&slug);
        if self.claim_directory(&parent, &primary)? {
            return Ok(primary);
        }

        let fallback = parent.join(format!("{}-{}", slug, sanitize::short_id(task_id)));
        ensure_directory(&fallback)?;
        Ok(fallback)
    }

    /// Returns `Ok(false)` when `dir` already exists.
    fn claim_directory(&self, parent: &Path, dir: &Path) -> Result<bool, StorageError> {
        // The sweep may remove an emptied owner directory between the two
        // calls, so a vanished parent gets one retry.
        for _ in 0..2 {
            ensure_directory(parent)?;
            match std::fs::create_dir(dir) {
                Ok(()) => return Ok(true),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(StorageError::CreateDirectory {
                        path: dir.to_path_buf(),
                        source: e,
                    })
                }
            }
        }

        Err(StorageError::CreateDirectory {
            path: dir.to_path_buf(),
            source: std::io::Error::new(ErrorKind::NotFound, "parent directory vanished"),
        })
    }

    /// Copies `source` into `workspace` as `file_name`.
    pub fn copy_into(
        &self,
        source: &Path,
        workspace: &Path,
        file_name: &str,
    ) -> Result<PathBuf, StorageError> {
        let target = workspace.join(file_name);
        std::fs::copy(source, &target).map_err(|e| StorageError::CopyFile {
            from: source.to_path_buf(),
            to: target.clone(),
            source: e,
        })?;
        Ok(target)
    }

    /// Writes `content` to `workspace/file_name`, replacing any existing file.
    pub fn write_file(
        &self,
        workspace: &Path,
        file_name: &str,
        content: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let target = workspace.join(file_name);
        std::fs::write(&target, content).map_err(|e| StorageError::WriteFile {
            path: target.clone(),
            source: e,
        })?;
        Ok(target)
    }
}

pub(crate) fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
        path: path.to_path_buf(),
        source: e,
    })
}
