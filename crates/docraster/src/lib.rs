pub mod auth;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod processor;
pub mod sanitize;
pub mod service;
pub mod storage;
pub mod task;
pub mod telemetry;
pub mod worker;

pub use auth::{Authenticator, ChainAuthenticator, Principal};
pub use config::{load_settings, Settings};
pub use error::{
    ConfigError, ConversionError, DocrasterError, Result, StorageError, WorkerError,
};
pub use pipeline::{Pipeline, PipelineConfig, PipelineContext, PipelineError};
pub use service::{SubmitRequest, TaskService, TaskView, Upload};
pub use storage::WorkspaceStore;
pub use task::{BackgroundMode, Task, TaskState, TaskTable};
pub use worker::{PoolConfig, WorkerPool};
