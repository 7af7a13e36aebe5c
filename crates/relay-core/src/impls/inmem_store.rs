//! In-memory stores for tests and local experiments.
//!
//! Records are kept as `TaskRecord`s, the same shape the file store writes,
//! so code reading them back sees exactly what would be on disk.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{Task, TaskId, TaskRecord};
use crate::error::StoreError;
use crate::ports::{ArtifactStore, TaskStore};

#[derive(Default)]
pub struct InMemoryTaskStore {
    records: Mutex<BTreeMap<TaskId, TaskRecord>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: TaskId) -> Option<TaskRecord> {
        self.records.lock().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Seed a raw record (e.g. one left behind by a crash).
    pub async fn insert(&self, record: TaskRecord) {
        self.records.lock().await.insert(record.id, record);
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn persist(&self, task: &Task) -> Result<(), StoreError> {
        self.insert(TaskRecord::from(task)).await;
        Ok(())
    }

    async fn delete(&self, id: TaskId) -> Result<(), StoreError> {
        self.records.lock().await.remove(&id);
        Ok(())
    }

    async fn recover_all(&self) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(self.records.lock().await.values().cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryArtifactStore {
    blobs: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, id: TaskId, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let path = PathBuf::from(format!("memory/{}.jpg", id.as_ulid()));
        self.blobs.lock().await.insert(path.clone(), bytes.to_vec());
        Ok(path)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_path_buf()))
    }

    async fn remove(&self, path: &Path) -> Result<(), StoreError> {
        self.blobs.lock().await.remove(path);
        Ok(())
    }
}
