use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a task as seen by API readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Processing => "processing",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// Whether `self -> next` is a legal lifecycle step.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Pending, TaskState::Processing)
                | (TaskState::Processing, TaskState::Completed)
                | (TaskState::Processing, TaskState::Failed)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How rendered pages are composited before packaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundMode {
    #[default]
    None,
    Color,
    Image,
}

impl BackgroundMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackgroundMode::None => "none",
            BackgroundMode::Color => "color",
            BackgroundMode::Image => "image",
        }
    }
}

impl fmt::Display for BackgroundMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackgroundMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(BackgroundMode::None),
            "color" => Ok(BackgroundMode::Color),
            "image" => Ok(BackgroundMode::Image),
            other => Err(format!("Unsupported background type '{}'", other)),
        }
    }
}

/// Principal that submitted a task. Fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub id: i64,
    pub email: Option<String>,
}

/// What a successful pipeline run leaves behind.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOutput {
    pub workspace: PathBuf,
    pub archive_path: PathBuf,
    pub original_snapshot: Option<PathBuf>,
    pub expires_at: DateTime<Utc>,
    pub page_count: usize,
}

/// Mutable part of a task. Carrying the result or the error inside the
/// variant keeps "error xor result" true by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed(ConversionOutput),
    Failed { error: String },
}

impl TaskStatus {
    pub fn state(&self) -> TaskState {
        match self {
            TaskStatus::Pending => TaskState::Pending,
            TaskStatus::Processing => TaskState::Processing,
            TaskStatus::Completed(_) => TaskState::Completed,
            TaskStatus::Failed { .. } => TaskState::Failed,
        }
    }
}

/// Generates a 32 character hex identifier for tasks and batches.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    /// Uploaded file. Deleted once the pipeline has read it.
    pub source_path: PathBuf,
    pub source_name: String,
    pub created_at: DateTime<Utc>,
    pub dpi: u32,
    pub background: BackgroundMode,
    pub background_color: Option<String>,
    /// Per-task copy of the background upload.
    pub background_image: Option<PathBuf>,
    pub batch_id: Option<String>,
    pub owner: Owner,
    pub status: TaskStatus,
}

impl Task {
    pub fn new(source_path: PathBuf, source_name: impl Into<String>, dpi: u32, owner: Owner) -> Self {
        Self {
            id: generate_id(),
            source_path,
            source_name: source_name.into(),
            created_at: Utc::now(),
            dpi,
            background: BackgroundMode::None,
            background_color: None,
            background_image: None,
            batch_id: None,
            owner,
            status: TaskStatus::Pending,
        }
    }

    pub fn with_color_background(mut self, color: Option<String>) -> Self {
        self.background = BackgroundMode::Color;
        self.background_color = color;
        self
    }

    pub fn with_image_background(mut self, image: Option<PathBuf>) -> Self {
        self.background = BackgroundMode::Image;
        self.background_image = image;
        self
    }

    pub fn with_batch(mut self, batch_id: Option<String>) -> Self {
        self.batch_id = batch_id;
        self
    }

    pub fn state(&self) -> TaskState {
        self.status.state()
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            TaskStatus::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn output(&self) -> Option<&ConversionOutput> {
        match &self.status {
            TaskStatus::Completed(output) => Some(output),
            _ => None,
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.output().map(|o| o.expires_at)
    }

    pub fn is_owned_by(&self, owner_id: i64) -> bool {
        self.owner.id == owner_id
    }

    /// Directory segment grouping this owner's workspaces.
    pub fn owner_segment(&self) -> String {
        self.owner.id.to_string()
    }
}
