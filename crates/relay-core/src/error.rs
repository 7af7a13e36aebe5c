use std::path::PathBuf;

use thiserror::Error;

use crate::domain::{RecordError, TaskId, ValidationError};
use crate::queue::QueueError;

/// Durable record / artifact I/O failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode record {id}: {source}")]
    Encode {
        id: TaskId,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot decode record {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid record {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: RecordError,
    },

    #[error("artifact not found: {0}")]
    NotFound(PathBuf),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("relay already started")]
    AlreadyStarted,
}
