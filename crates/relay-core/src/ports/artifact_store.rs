//! ArtifactStore port - アップロードされた binary の保存先
//!
//! durable record はパスだけを持ち、中身は表示・送信のたびにここから読みます。

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::TaskId;
use crate::error::StoreError;

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store decoded upload bytes for `id`, returning the reference path.
    async fn put(&self, id: TaskId, bytes: &[u8]) -> Result<PathBuf, StoreError>;

    /// Load the bytes behind a reference returned by `put`.
    async fn read(&self, path: &Path) -> Result<Vec<u8>, StoreError>;

    /// Delete an upload. A missing file is not an error.
    async fn remove(&self, path: &Path) -> Result<(), StoreError>;
}
