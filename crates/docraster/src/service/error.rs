use thiserror::Error;

use crate::auth::AuthError;
use crate::error::{StorageError, WorkerError};
use crate::task::TaskState;

/// Coarse category a transport layer can map to a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    NotFound,
    BadRequest,
    Internal,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    #[error("Result not found for task {0}")]
    ResultMissing(String),

    #[error("Task {task_id} not completed (state: {state})")]
    NotCompleted { task_id: String, state: TaskState },

    #[error("Original snapshot not available for task {0}")]
    SnapshotUnavailable(String),

    #[error("{pending} task(s) still processing. Please wait.")]
    BatchIncomplete { pending: usize },

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Failed to create batch archive: {0}")]
    BatchArchive(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Auth(AuthError::NotPermitted) => ErrorKind::Forbidden,
            ServiceError::Auth(AuthError::ProviderUnavailable(_)) => ErrorKind::Internal,
            ServiceError::Auth(_) => ErrorKind::Unauthorized,
            ServiceError::TaskNotFound(_)
            | ServiceError::BatchNotFound(_)
            | ServiceError::ResultMissing(_) => ErrorKind::NotFound,
            ServiceError::NotCompleted { .. }
            | ServiceError::SnapshotUnavailable(_)
            | ServiceError::BatchIncomplete { .. }
            | ServiceError::InvalidRequest(_) => ErrorKind::BadRequest,
            ServiceError::BatchArchive(_) | ServiceError::Storage(_) | ServiceError::Worker(_) => {
                ErrorKind::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_incomplete_message() {
        let err = ServiceError::BatchIncomplete { pending: 2 };
        assert_eq!(err.to_string(), "2 task(s) still processing. Please wait.");
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            ServiceError::from(AuthError::NotPermitted).kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(
            ServiceError::from(AuthError::MissingToken).kind(),
            ErrorKind::Unauthorized
        );
        assert_eq!(
            ServiceError::TaskNotFound("x".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ServiceError::from(WorkerError::ChannelClosed).kind(),
            ErrorKind::Internal
        );
    }
}
