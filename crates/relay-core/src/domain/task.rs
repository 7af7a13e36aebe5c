use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use super::TaskId;
use super::errors::StateError;
use super::state::TaskStatus;

/// Forwarding method, as written in the durable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "gif")]
    Gif,
    #[serde(rename = "photo.url")]
    PhotoUrl,
    #[serde(rename = "photo.file")]
    PhotoFile,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Gif => "gif",
            Method::PhotoUrl => "photo.url",
            Method::PhotoFile => "photo.file",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Method + payload. The variant decides whether the task carries a URL or a
/// file reference, so a task can never hold both or neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forward {
    Gif { url: String },
    PhotoUrl { url: String },
    /// Binary content already written to the upload directory.
    PhotoFile { file: PathBuf },
}

impl Forward {
    pub fn method(&self) -> Method {
        match self {
            Forward::Gif { .. } => Method::Gif,
            Forward::PhotoUrl { .. } => Method::PhotoUrl,
            Forward::PhotoFile { .. } => Method::PhotoFile,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Forward::Gif { url } | Forward::PhotoUrl { url } => Some(url),
            Forward::PhotoFile { .. } => None,
        }
    }

    pub fn file(&self) -> Option<&Path> {
        match self {
            Forward::PhotoFile { file } => Some(file),
            _ => None,
        }
    }
}

/// The unit of forwarding work.
///
/// `id`, `endpoint` and the forward payload are fixed at admission. Only the
/// owning worker (or the queue, for removal) changes `status` and `retries`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    id: TaskId,
    endpoint: String,
    forward: Forward,
    retries: u32,
    status: TaskStatus,
}

impl Task {
    /// A freshly admitted task (`queued`, no retries).
    pub fn new(id: TaskId, endpoint: impl Into<String>, forward: Forward) -> Self {
        Self {
            id,
            endpoint: endpoint.into(),
            forward,
            retries: 0,
            status: TaskStatus::Queued,
        }
    }

    /// Rebuild a task from stored fields without validating the status.
    pub(crate) fn restore(
        id: TaskId,
        endpoint: String,
        forward: Forward,
        retries: u32,
        status: TaskStatus,
    ) -> Self {
        Self {
            id,
            endpoint,
            forward,
            retries,
            status,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn forward(&self) -> &Forward {
        &self.forward
    }

    pub fn method(&self) -> Method {
        self.forward.method()
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Apply a status change through the state machine.
    pub fn transition(&mut self, next: TaskStatus) -> Result<(), StateError> {
        self.status = self.status.transition(next)?;
        Ok(())
    }

    /// `processing -> queued` with the retry counter bumped.
    pub fn schedule_retry(&mut self) -> Result<u32, StateError> {
        self.transition(TaskStatus::Queued)?;
        self.retries += 1;
        Ok(self.retries)
    }

    /// Recovery reconciliation: a `processing` record found at start-up has no
    /// worker behind it any more.
    pub(crate) fn reset_interrupted(&mut self) -> bool {
        if self.status == TaskStatus::Processing {
            self.status = TaskStatus::Queued;
            true
        } else {
            false
        }
    }
}
