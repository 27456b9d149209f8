pub mod config;
pub mod context;
pub mod error;
pub mod runner;

pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::PipelineError;
pub use runner::{
    archive_file_name, download_url, original_snapshot_url, page_file_name, Pipeline, IMAGES_DIR,
    SNAPSHOT_FILE,
};
