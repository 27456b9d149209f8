use thiserror::Error;

use crate::error::{ConfigError, ConversionError, StorageError};

/// Failure of one pipeline run. The display prefix names the category so a
/// failed task's detail string tells configuration problems apart from bad
/// input documents.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl PipelineError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, PipelineError::Configuration(_))
    }
}
