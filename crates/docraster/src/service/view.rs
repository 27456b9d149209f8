use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::{download_url, original_snapshot_url};
use crate::task::{Task, TaskState};

/// What a status reader sees for one task.
///
/// Links and `expires_at` only appear once the task is completed; `detail`
/// only when it failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub task_id: String,
    pub source_name: String,
    pub state: TaskState,
    pub detail: Option<String>,
    pub download_url: Option<String>,
    pub batch_id: Option<String>,
    pub batch_download_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub original_snapshot_url: Option<String>,
    pub owner_id: i64,
    pub owner_email: Option<String>,
}

impl From<&Task> for TaskView {
    fn from(task: &Task) -> Self {
        let completed = task.state() == TaskState::Completed;
        Self {
            task_id: task.id.clone(),
            source_name: task.source_name.clone(),
            state: task.state(),
            detail: task.error().map(str::to_string),
            download_url: download_url(task),
            batch_id: task.batch_id.clone(),
            batch_download_url: task
                .batch_id
                .as_ref()
                .filter(|_| completed)
                .map(|b| format!("/batches/{}/download", b)),
            expires_at: task.expires_at(),
            original_snapshot_url: original_snapshot_url(task),
            owner_id: task.owner.id,
            owner_email: task.owner.email.clone(),
        }
    }
}

/// A file ready to be streamed back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub path: PathBuf,
    pub filename: String,
    pub content_type: String,
}
