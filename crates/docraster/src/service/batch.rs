use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::error::ServiceError;
use crate::pipeline::IMAGES_DIR;

/// Combined archive for a finished batch. The temporary file is removed when
/// this value is dropped.
pub struct BatchArchive {
    file: NamedTempFile,
    pub filename: String,
    pub entries: usize,
}

impl BatchArchive {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Keep the archive at `dest` instead of deleting it on drop.
    pub fn persist(self, dest: &Path) -> Result<PathBuf, ServiceError> {
        self.file
            .persist(dest)
            .map_err(|e| archive_error(e.error))?;
        Ok(dest.to_path_buf())
    }
}

fn archive_error(e: impl std::fmt::Display) -> ServiceError {
    ServiceError::BatchArchive(e.to_string())
}

pub fn batch_file_name(batch_id: &str) -> String {
    format!("batch-{}.zip", batch_id)
}

/// Page images of one workspace, sorted by file name.
fn page_images(workspace: &Path) -> Vec<PathBuf> {
    let images = workspace.join(IMAGES_DIR);
    if !images.is_dir() {
        return Vec::new();
    }

    WalkDir::new(&images)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("png"))
        .collect()
}

/// Writes every page of every workspace into one zip, each under a folder
/// named after its workspace directory.
pub(crate) fn build_batch_archive(
    batch_id: &str,
    workspaces: &[PathBuf],
) -> Result<BatchArchive, ServiceError> {
    let file = tempfile::Builder::new()
        .prefix("batch-")
        .suffix(".zip")
        .tempfile()
        .map_err(archive_error)?;

    let mut writer = ZipWriter::new(file.reopen().map_err(archive_error)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut entries = 0;

    for workspace in workspaces {
        let Some(folder) = workspace.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        for page in page_images(workspace) {
            let Some(name) = page.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            writer
                .start_file(format!("{}/{}", folder, name), options)
                .map_err(archive_error)?;
            let mut input = File::open(&page).map_err(archive_error)?;
            io::copy(&mut input, &mut writer).map_err(archive_error)?;
            entries += 1;
        }
    }

    writer.finish().map_err(archive_error)?;

    Ok(BatchArchive {
        file,
        filename: batch_file_name(batch_id),
        entries,
    })
}
