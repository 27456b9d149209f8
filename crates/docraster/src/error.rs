use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::task::TaskState;

#[derive(Error, Debug)]
pub enum DocrasterError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Service error: {0}")]
    Service(#[from] crate::service::ServiceError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Settings validation failed: {message}")]
    Validation { message: String },

    #[error("{tool} not found ({source}). Check the configured path for '{tool}'.")]
    ToolMissing {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("LibreOffice failed ({status}): {stderr}")]
    ConverterFailed { status: String, stderr: String },

    #[error("LibreOffice did not finish within {timeout:?}")]
    ConverterTimeout { timeout: Duration },

    #[error("Unsupported document format '{0}'")]
    UnsupportedFormat(String),

    #[error("PDF conversion produced no output")]
    NoPdfOutput,

    #[error("PDF to image conversion failed: {0}")]
    Rasterize(String),

    #[error("PDF to image conversion produced no pages")]
    NoPages,

    #[error("Background color required for color background")]
    MissingBackgroundColor,

    #[error("Invalid background color '{0}'")]
    InvalidColor(String),

    #[error("Background image missing")]
    MissingBackgroundImage,

    #[error("Failed to load background image '{path}': {reason}")]
    BackgroundImage { path: PathBuf, reason: String },

    #[error("Failed to write image '{path}': {reason}")]
    WriteImage { path: PathBuf, reason: String },

    #[error("Failed to build archive '{path}': {reason}")]
    Archive { path: PathBuf, reason: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy file from '{from}' to '{to}': {source}")]
    CopyFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker pool is shut down")]
    ChannelClosed,

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Task {task_id} cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskState,
        to: TaskState,
    },
}

pub type Result<T> = std::result::Result<T, DocrasterError>;
