use std::path::PathBuf;

use chrono::{DateTime, Utc};
use image::DynamicImage;

use crate::processor::{BackgroundSpec, DocumentFormat};
use crate::task::Task;

pub struct PipelineContext {
    // Input
    pub task: Task,

    // Step 1 results
    pub workspace: Option<PathBuf>,
    pub format: Option<DocumentFormat>,
    pub source_copy: Option<PathBuf>,

    // Step 2 result
    pub background: Option<BackgroundSpec>,

    // Step 3 result
    pub pdf_path: Option<PathBuf>,

    // Step 4 results: rendered pages, plus an untouched copy of page one
    pub pages: Vec<DynamicImage>,
    pub first_page: Option<DynamicImage>,

    // Step 6 results
    pub page_paths: Vec<PathBuf>,
    pub snapshot_path: Option<PathBuf>,
    pub archive_path: Option<PathBuf>,

    // Step 7 result
    pub expires_at: Option<DateTime<Utc>>,
}

impl PipelineContext {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            workspace: None,
            format: None,
            source_copy: None,
            background: None,
            pdf_path: None,
            pages: Vec::new(),
            first_page: None,
            page_paths: Vec::new(),
            snapshot_path: None,
            archive_path: None,
            expires_at: None,
        }
    }
}
