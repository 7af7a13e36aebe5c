//! File-system stores rooted at the upload directory.
//!
//! - `<dir>/<ulid>.json`: durable record（1 タスク 1 ファイル）
//! - `<dir>/<ulid>.jpg`: デコード済みアップロード
//!
//! 書き込みは一時ファイル + rename なので、途中でクラッシュしても
//! 中途半端な record は残りません。

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::domain::{Task, TaskId, TaskRecord};
use crate::error::StoreError;
use crate::ports::{ArtifactStore, TaskStore};

const RECORD_EXT: &str = "json";
const ARTIFACT_EXT: &str = "jpg";

async fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| StoreError::io(dir, e))
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}

pub struct FsTaskStore {
    dir: PathBuf,
}

impl FsTaskStore {
    /// Create the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        ensure_dir(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, id: TaskId) -> PathBuf {
        self.dir
            .join(format!("{}.{RECORD_EXT}", id.as_ulid()))
    }

    async fn read_record(path: &Path) -> Result<TaskRecord, StoreError> {
        let bytes = fs::read(path).await.map_err(|e| StoreError::io(path, e))?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[async_trait]
impl TaskStore for FsTaskStore {
    async fn persist(&self, task: &Task) -> Result<(), StoreError> {
        let record = TaskRecord::from(task);
        let bytes = serde_json::to_vec(&record).map_err(|source| StoreError::Encode {
            id: task.id(),
            source,
        })?;
        write_atomic(&self.record_path(task.id()), &bytes).await
    }

    async fn delete(&self, id: TaskId) -> Result<(), StoreError> {
        let path = self.record_path(id);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    async fn recover_all(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable task record");
                }
            }
        }

        records.sort_by_key(|r| r.id);
        Ok(records)
    }
}

pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        ensure_dir(&dir).await?;
        Ok(Self { dir })
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, id: TaskId, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let path = self.dir.join(format!("{}.{ARTIFACT_EXT}", id.as_ulid()));
        write_atomic(&path, bytes).await?;
        Ok(path)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>, StoreError> {
        match fs::read(path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(path.to_path_buf())),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    async fn remove(&self, path: &Path) -> Result<(), StoreError> {
        match fs::remove_file(path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(StoreError::io(path, e)),
            _ => Ok(()),
        }
    }
}
