//! TaskStore port - crash recovery 用の durable record
//!
//! # 設計原則
//! - persist は enqueue より先に完了させる（write-ahead）
//! - delete は best-effort（対象が無くてもエラーにしない）
//! - recover_all は起動時に一度だけ呼ぶ

use async_trait::async_trait;

use crate::domain::{Task, TaskId, TaskRecord};
use crate::error::StoreError;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Idempotent upsert of the task's record.
    async fn persist(&self, task: &Task) -> Result<(), StoreError>;

    /// Remove the record. A missing record is not an error.
    async fn delete(&self, id: TaskId) -> Result<(), StoreError>;

    /// Every readable record, sorted by id. Unreadable records are skipped.
    async fn recover_all(&self) -> Result<Vec<TaskRecord>, StoreError>;
}
