//! Ingestion surface: what an HTTP layer (or the CLI) calls.
//!
//! Every read is owner-only. Status reads trigger the expiry sweep so stale
//! workspaces disappear without a dedicated timer.

pub mod batch;
pub mod error;
pub mod view;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::auth::{authorize_owner, parse_bearer, Authenticator, Principal};
use crate::config::{Settings, MAX_DPI, MIN_DPI};
use crate::error::DocrasterError;
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::processor::{content_type_for, is_allowed_upload, parse_hex_color};
use crate::storage::{remove_path, SweepReport, WorkspaceStore};
use crate::task::{generate_id, BackgroundMode, Task, TaskState, TaskTable};
use crate::worker::{PoolConfig, WorkerPool};

pub use batch::{batch_file_name, BatchArchive};
pub use error::{ErrorKind, ServiceError};
pub use view::{Download, TaskView};

/// One uploaded file.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Reads a local file as if it had been uploaded under its own name.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(filename, std::fs::read(path)?))
    }

    /// Lowercased suffix including the dot, or `fallback`.
    fn suffix_or(&self, fallback: &str) -> String {
        Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_else(|| fallback.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub files: Vec<Upload>,
    pub background: BackgroundMode,
    pub background_color: Option<String>,
    pub background_image: Option<Upload>,
    /// Falls back to `default_dpi` from settings.
    pub dpi: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub workers: usize,
    pub queued: usize,
}

pub struct TaskService {
    settings: Settings,
    pool: WorkerPool,
    store: WorkspaceStore,
    authenticator: Box<dyn Authenticator>,
}

impl TaskService {
    pub fn new(settings: Settings, pool: WorkerPool, authenticator: Box<dyn Authenticator>) -> Self {
        let store = WorkspaceStore::new(settings.result_dir());
        Self {
            settings,
            pool,
            store,
            authenticator,
        }
    }

    /// Creates the data directories and starts a pool running the production
    /// pipeline.
    pub fn start(
        settings: Settings,
        authenticator: Box<dyn Authenticator>,
    ) -> Result<Self, DocrasterError> {
        let pipeline = Pipeline::from_config(Arc::new(PipelineConfig::from_settings(&settings)));
        Self::with_pipeline(settings, pipeline, authenticator)
    }

    /// Like [`TaskService::start`] with a caller-built pipeline.
    pub fn with_pipeline(
        settings: Settings,
        pipeline: Pipeline,
        authenticator: Box<dyn Authenticator>,
    ) -> Result<Self, DocrasterError> {
        settings.ensure_directories()?;
        let pool = WorkerPool::start(
            Arc::new(pipeline),
            Arc::new(TaskTable::new()),
            PoolConfig::from_settings(&settings),
        )?;
        Ok(Self::new(settings, pool, authenticator))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn authenticate(&self, authorization: &str) -> Result<Principal, ServiceError> {
        let token = parse_bearer(authorization)?;
        Ok(self.authenticator.authenticate(&token)?)
    }

    /// Validates the request, stores the uploads and queues one task per
    /// accepted document.
    pub fn submit(
        &self,
        principal: &Principal,
        request: SubmitRequest,
    ) -> Result<Vec<TaskView>, ServiceError> {
        if request.files.is_empty() {
            return Err(ServiceError::InvalidRequest("No files provided".to_string()));
        }

        let dpi = request.dpi.unwrap_or(self.settings.default_dpi);
        if !(MIN_DPI..=MAX_DPI).contains(&dpi) {
            return Err(ServiceError::InvalidRequest(format!(
                "DPI must be between {} and {}",
                MIN_DPI, MAX_DPI
            )));
        }

        let color = match request.background {
            BackgroundMode::Color => {
                let color = request
                    .background_color
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| {
                        ServiceError::InvalidRequest("Background color required".to_string())
                    })?;
                parse_hex_color(color)
                    .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;
                Some(color.to_string())
            }
            _ => None,
        };

        let background_image = match request.background {
            BackgroundMode::Image => Some(request.background_image.as_ref().ok_or_else(|| {
                ServiceError::InvalidRequest("Background image file required".to_string())
            })?),
            _ => None,
        };

        let accepted: Vec<&Upload> = request
            .files
            .iter()
            .filter(|upload| {
                let allowed = is_allowed_upload(&upload.filename);
                if !allowed {
                    debug!("Skipping unsupported upload '{}'", upload.filename);
                }
                allowed
            })
            .collect();

        if accepted.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "No supported documents found".to_string(),
            ));
        }

        let batch_id = (accepted.len() > 1).then(generate_id);
        let upload_dir = self.settings.upload_dir();
        let mut views = Vec::with_capacity(accepted.len());

        for upload in accepted {
            let source_path = upload_dir.join(format!(
                "{}{}",
                generate_id(),
                upload.suffix_or("")
            ));
            write_upload(&source_path, &upload.bytes)?;

            let mut task = Task::new(source_path.clone(), &upload.filename, dpi, principal.owner())
                .with_batch(batch_id.clone());

            match request.background {
                BackgroundMode::None => {}
                BackgroundMode::Color => task = task.with_color_background(color.clone()),
                BackgroundMode::Image => {
                    if let Some(image) = background_image {
                        let path = upload_dir.join(format!(
                            "bg-{}{}",
                            task.id,
                            image.suffix_or(".png")
                        ));
                        if let Err(e) = write_upload(&path, &image.bytes) {
                            remove_path(&source_path);
                            return Err(e);
                        }
                        task = task.with_image_background(Some(path));
                    }
                }
            }

            let view = TaskView::from(&task);
            let cleanup = [Some(source_path), task.background_image.clone()];
            if let Err(e) = self.pool.submit(task) {
                for path in cleanup.iter().flatten() {
                    remove_path(path);
                }
                return Err(e.into());
            }
            views.push(view);
        }

        info!(
            "Accepted {} document(s) from user {}{}",
            views.len(),
            principal.id,
            batch_id
                .as_deref()
                .map(|b| format!(" as batch {}", b))
                .unwrap_or_default()
        );
        Ok(views)
    }

    pub fn status(&self, principal: &Principal, task_id: &str) -> Result<TaskView, ServiceError> {
        let task = self.owned_task(principal, task_id)?;
        self.sweep();
        Ok(TaskView::from(&task))
    }

    pub fn download(&self, principal: &Principal, task_id: &str) -> Result<Download, ServiceError> {
        let task = self.owned_task(principal, task_id)?;
        let output = task.output().ok_or_else(|| ServiceError::NotCompleted {
            task_id: task.id.clone(),
            state: task.state(),
        })?;

        serve(&output.archive_path, &task.id)
    }

    pub fn original_snapshot(
        &self,
        principal: &Principal,
        task_id: &str,
    ) -> Result<Download, ServiceError> {
        let task = self.owned_task(principal, task_id)?;
        let snapshot = task
            .output()
            .and_then(|o| o.original_snapshot.as_ref())
            .ok_or_else(|| ServiceError::SnapshotUnavailable(task.id.clone()))?;

        serve(snapshot, &task.id)
    }

    /// Zips the pages of every task in the batch owned by `principal`.
    pub fn batch_download(
        &self,
        principal: &Principal,
        batch_id: &str,
    ) -> Result<BatchArchive, ServiceError> {
        let tasks: Vec<Task> = self
            .pool
            .table()
            .batch(batch_id)
            .into_iter()
            .filter(|t| t.is_owned_by(principal.id))
            .collect();

        if tasks.is_empty() {
            return Err(ServiceError::BatchNotFound(batch_id.to_string()));
        }

        let pending = tasks
            .iter()
            .filter(|t| t.state() != TaskState::Completed)
            .count();
        if pending > 0 {
            return Err(ServiceError::BatchIncomplete { pending });
        }

        let workspaces: Vec<PathBuf> = tasks
            .iter()
            .filter_map(|t| t.output().map(|o| o.workspace.clone()))
            .collect();
        batch::build_batch_archive(batch_id, &workspaces)
    }

    /// Removes expired workspaces now.
    pub fn sweep(&self) -> SweepReport {
        let report = self.store.sweep_expired(Utc::now());
        if report.removed_count() > 0 {
            info!("Removed {} expired workspace(s)", report.removed_count());
        }
        report
    }

    pub fn health(&self) -> Health {
        let status = if self.pool.is_running() { "ok" } else { "stopped" };
        Health {
            status: status.to_string(),
            workers: self.pool.worker_count(),
            queued: self.pool.queued(),
        }
    }

    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    fn owned_task(&self, principal: &Principal, task_id: &str) -> Result<Task, ServiceError> {
        let task = self
            .pool
            .table()
            .get(task_id)
            .ok_or_else(|| ServiceError::TaskNotFound(task_id.to_string()))?;
        authorize_owner(principal, &task)?;
        Ok(task)
    }
}

fn write_upload(path: &Path, bytes: &[u8]) -> Result<(), ServiceError> {
    std::fs::write(path, bytes).map_err(|e| {
        warn!("Failed to store upload '{}': {}", path.display(), e);
        ServiceError::Storage(crate::error::StorageError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    })
}

fn serve(path: &Path, task_id: &str) -> Result<Download, ServiceError> {
    if !path.is_file() {
        return Err(ServiceError::ResultMissing(task_id.to_string()));
    }
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Download {
        path: path.to_path_buf(),
        content_type: content_type_for(path),
        filename,
    })
}
