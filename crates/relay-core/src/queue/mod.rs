//! Queue module: pending / in-flight / history collections and retry policy.

mod memory;
mod retry;

pub use memory::{QueueCounts, QueueSnapshot, RemoveOutcome, TaskQueue};
pub use retry::RetryPolicy;

use thiserror::Error;

use crate::domain::TaskId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("task {0} is already queued or in flight")]
    AlreadyQueued(TaskId),
}
