//! Durable record: the on-disk shape of a task.
//!
//! `{id, method, endpoint, url, file, retries, status}`
//! - binary は埋め込まない（`file` はパスのみ）
//! - method と url/file の組み合わせは復元時に検証する

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use super::state::TaskStatus;
use super::task::{Forward, Method, Task};
use super::TaskId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub method: Method,
    pub endpoint: String,
    pub url: Option<String>,
    pub file: Option<String>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_status")]
    pub status: TaskStatus,
}

fn default_status() -> TaskStatus {
    TaskStatus::Queued
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record {id} ({method}) needs `{field}`")]
    MissingField {
        id: TaskId,
        method: Method,
        field: &'static str,
    },

    #[error("record {id} ({method}) must not carry `{field}`")]
    UnexpectedField {
        id: TaskId,
        method: Method,
        field: &'static str,
    },
}

impl From<&Task> for TaskRecord {
    fn from(task: &Task) -> Self {
        let forward = task.forward();
        Self {
            id: task.id(),
            method: task.method(),
            endpoint: task.endpoint().to_string(),
            url: forward.url().map(str::to_string),
            file: forward.file().map(|p| p.to_string_lossy().into_owned()),
            retries: task.retries(),
            status: task.status(),
        }
    }
}

impl TryFrom<TaskRecord> for Task {
    type Error = RecordError;

    fn try_from(record: TaskRecord) -> Result<Self, Self::Error> {
        let TaskRecord {
            id,
            method,
            endpoint,
            url,
            file,
            retries,
            status,
        } = record;

        let missing = |field| RecordError::MissingField { id, method, field };
        let unexpected = |field| RecordError::UnexpectedField { id, method, field };

        let forward = match method {
            Method::Gif | Method::PhotoUrl => {
                if file.is_some() {
                    return Err(unexpected("file"));
                }
                let url = url.ok_or_else(|| missing("url"))?;
                if method == Method::Gif {
                    Forward::Gif { url }
                } else {
                    Forward::PhotoUrl { url }
                }
            }
            Method::PhotoFile => {
                if url.is_some() {
                    return Err(unexpected("url"));
                }
                let file = file.ok_or_else(|| missing("file"))?;
                Forward::PhotoFile {
                    file: PathBuf::from(file),
                }
            }
        };

        Ok(Task::restore(id, endpoint, forward, retries, status))
    }
}

/// Task snapshot as pushed to subscribers: like the record, but `file` holds
/// the inlined content as a data URI instead of a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: TaskId,
    pub method: Method,
    pub endpoint: String,
    pub url: Option<String>,
    pub file: Option<String>,
    pub retries: u32,
    pub status: TaskStatus,
}

impl TaskView {
    pub fn new(task: &Task, file_data_uri: Option<String>) -> Self {
        Self {
            id: task.id(),
            method: task.method(),
            endpoint: task.endpoint().to_string(),
            url: task.forward().url().map(str::to_string),
            file: file_data_uri,
            retries: task.retries(),
            status: task.status(),
        }
    }
}
