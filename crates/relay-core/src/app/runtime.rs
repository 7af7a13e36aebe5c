//! Relay - アプリケーションのランタイム
//!
//! queue / store / broadcaster を所有し、外側（HTTP, websocket）には
//! メソッドだけを見せます。共有コレクションそのものは外に出しません。
//!
//! # 起動順
//! 1. `recover()`: 前回の durable record を pending / history に戻す
//! 2. `start()`: fan-out ループと dispatcher を起動
//! 3. `RelayHandle::shutdown()`: dispatch を止め、実行中のワーカーを待つ

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::broadcaster::{Broadcaster, FanOut};
use super::ingress::{Submission, validate_endpoint};
use super::status::{self, RelayStatus};
use super::worker_loop::{Worker, WorkerPool};
use crate::config::RelayConfig;
use crate::domain::{
    ClientMessage, Forward, ServerMessage, SubscriberId, Task, TaskId, TaskStatus,
};
use crate::error::RelayError;
use crate::ports::{ArtifactStore, IdGenerator, TaskStore};
use crate::queue::{QueueError, RemoveOutcome, TaskQueue};

/// What `recover()` did with the stored records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Back in pending (including `reset`).
    pub requeued: usize,
    /// Were `processing` when the previous run stopped.
    pub reset: usize,
    /// `failed` records shown in history again.
    pub failed: usize,
    /// Finished records whose delete never happened; deleted now.
    pub discarded: usize,
    pub invalid: usize,
}

pub struct Relay {
    config: RelayConfig,
    queue: Arc<TaskQueue>,
    store: Arc<dyn TaskStore>,
    artifacts: Arc<dyn ArtifactStore>,
    broadcaster: Arc<Broadcaster>,
    worker: Arc<Worker>,
    ids: Arc<dyn IdGenerator>,
    /// Taken by the first `start()`.
    fan_out: Mutex<Option<FanOut>>,
}

impl Relay {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: RelayConfig,
        queue: Arc<TaskQueue>,
        store: Arc<dyn TaskStore>,
        artifacts: Arc<dyn ArtifactStore>,
        broadcaster: Arc<Broadcaster>,
        fan_out: FanOut,
        worker: Arc<Worker>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            config,
            queue,
            store,
            artifacts,
            broadcaster,
            worker,
            ids,
            fan_out: Mutex::new(Some(fan_out)),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Accept a validated submission: write-ahead persist, broadcast, enqueue.
    ///
    /// The record is on disk before the task can be dispatched. On a store
    /// error nothing is enqueued.
    pub async fn admit(&self, endpoint: &str, submission: Submission) -> Result<TaskId, RelayError> {
        let endpoint = validate_endpoint(endpoint)?;
        let id = self.ids.generate_task_id();

        let forward = match submission {
            Submission::Gif { url } => Forward::Gif { url },
            Submission::PhotoUrl { url } => Forward::PhotoUrl { url },
            Submission::PhotoBytes { bytes } => Forward::PhotoFile {
                file: self.artifacts.put(id, &bytes).await?,
            },
        };
        let task = Task::new(id, endpoint, forward);

        if let Err(e) = self.store.persist(&task).await {
            if let Some(file) = task.forward().file() {
                if let Err(cleanup) = self.artifacts.remove(file).await {
                    tracing::warn!(task_id = %id, error = %cleanup, "cannot remove orphaned upload");
                }
            }
            return Err(e.into());
        }
        self.broadcaster.publish(&task).await;
        tracing::info!(task_id = %id, method = %task.method(), endpoint, "task queued");
        self.queue.enqueue(task).await?;
        Ok(id)
    }

    /// Parse a raw `{method, params}` body and admit it.
    pub async fn admit_body(&self, endpoint: &str, body: &[u8]) -> Result<TaskId, RelayError> {
        let submission = Submission::parse_slice(body)?;
        self.admit(endpoint, submission).await
    }

    /// Reload stored records. Call once, before `start()`.
    ///
    /// Only a failure to list the records is fatal.
    pub async fn recover(&self) -> Result<RecoveryReport, RelayError> {
        let mut report = RecoveryReport::default();

        for record in self.store.recover_all().await? {
            let record_id = record.id;
            let mut task = match Task::try_from(record) {
                Ok(task) => task,
                Err(e) => {
                    tracing::warn!(task_id = %record_id, error = %e, "skipping invalid task record");
                    report.invalid += 1;
                    continue;
                }
            };
            let id = task.id();

            match task.status() {
                TaskStatus::Queued | TaskStatus::Processing => {
                    if task.reset_interrupted() {
                        if let Err(e) = self.store.persist(&task).await {
                            tracing::error!(task_id = %id, error = %e, "cannot persist reset task record");
                        }
                        report.reset += 1;
                    }
                    match self.queue.enqueue(task).await {
                        Ok(()) => report.requeued += 1,
                        Err(QueueError::AlreadyQueued(_)) => {
                            tracing::debug!(task_id = %id, "recovered task already queued");
                        }
                    }
                }
                TaskStatus::Failed => {
                    self.queue.complete(task).await;
                    report.failed += 1;
                }
                TaskStatus::Completed | TaskStatus::Duplicate | TaskStatus::Removed => {
                    if let Err(e) = self.store.delete(id).await {
                        tracing::error!(task_id = %id, error = %e, "cannot delete finished task record");
                    }
                    report.discarded += 1;
                }
            }
        }

        tracing::info!(
            requeued = report.requeued,
            reset = report.reset,
            failed = report.failed,
            discarded = report.discarded,
            invalid = report.invalid,
            "recovery finished"
        );
        Ok(report)
    }

    /// Spawn the fan-out loop and the dispatcher. Only the first call succeeds.
    pub fn start(&self) -> Result<RelayHandle, RelayError> {
        let fan_out = self
            .fan_out
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or(RelayError::AlreadyStarted)?;

        let fan_out = tokio::spawn(fan_out.run());
        // validated by the builder
        let size = u32::try_from(self.config.pool_size).unwrap_or(u32::MAX);
        let workers = WorkerPool::spawn(size, Arc::clone(&self.queue), Arc::clone(&self.worker));
        tracing::info!(pool_size = size, "relay started");

        Ok(RelayHandle {
            workers,
            fan_out,
            broadcaster: Arc::clone(&self.broadcaster),
            grace: self.config.shutdown_grace,
        })
    }

    pub async fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<ServerMessage>) {
        let id = self.ids.generate_subscriber_id();
        let rx = self.broadcaster.subscribe(id).await;
        (id, rx)
    }

    pub async fn unsubscribe(&self, id: SubscriberId) {
        self.broadcaster.unsubscribe(id).await;
    }

    /// Answer one client frame. `None` means nothing goes back to the sender.
    pub async fn handle_message(&self, message: ClientMessage) -> Option<ServerMessage> {
        match message {
            ClientMessage::Ping => Some(ServerMessage::Pong),
            ClientMessage::GetTasks => Some(self.task_list().await),
            ClientMessage::ClearTasks => {
                let dropped = self.queue.clear_history().await;
                tracing::info!(dropped, "history cleared");
                Some(self.task_list().await)
            }
            ClientMessage::RemoveTask { id } => {
                match id.parse::<TaskId>() {
                    Ok(id) => {
                        self.remove_task(id).await;
                    }
                    Err(_) => tracing::warn!(id = %id, "remove_task with malformed id"),
                }
                None
            }
        }
    }

    pub async fn task_list(&self) -> ServerMessage {
        status::task_list(&self.queue, self.broadcaster.views()).await
    }

    /// Operator removal. Only a successful removal is broadcast.
    pub async fn remove_task(&self, id: TaskId) -> RemoveOutcome {
        match self.queue.remove_by_id(id).await {
            RemoveOutcome::Removed(mut task) => {
                if let Err(e) = task.transition(TaskStatus::Removed) {
                    tracing::error!(task_id = %id, error = %e, "removed task has unexpected status");
                }
                if let Err(e) = self.store.delete(id).await {
                    tracing::error!(task_id = %id, error = %e, "cannot delete task record");
                }
                tracing::info!(task_id = %id, "task removed");
                self.broadcaster.publish(&task).await;
                RemoveOutcome::Removed(task)
            }
            RemoveOutcome::Refused => {
                // in flight covers both a running call and a retry backoff
                tracing::warn!(task_id = %id, "cannot remove task while a worker owns it");
                RemoveOutcome::Refused
            }
            RemoveOutcome::NotFound => {
                tracing::warn!(task_id = %id, "cannot remove unknown task");
                RemoveOutcome::NotFound
            }
        }
    }

    /// Keep the history at the configured cap (or `cap` if given).
    pub async fn trim_history(&self, cap: Option<usize>) -> usize {
        self.queue
            .trim_history(cap.unwrap_or(self.config.history_cap))
            .await
    }

    pub async fn status(&self) -> RelayStatus {
        RelayStatus {
            queue: self.queue.counts().await,
            subscribers: self.broadcaster.subscriber_count().await,
        }
    }
}

pub struct RelayHandle {
    workers: WorkerPool,
    fan_out: JoinHandle<()>,
    broadcaster: Arc<Broadcaster>,
    grace: Duration,
}

/// How a shutdown went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every running worker finished within the grace period.
    pub drained: bool,
}

impl RelayHandle {
    /// Stop dispatching, give running workers up to the configured grace,
    /// deliver what they published, then stop the fan-out loop.
    pub async fn shutdown(self) -> ShutdownReport {
        let grace = self.grace;
        self.shutdown_with_grace(grace).await
    }

    pub async fn shutdown_with_grace(self, grace: Duration) -> ShutdownReport {
        tracing::info!(grace_ms = grace.as_millis() as u64, "relay shutting down");
        let drained = self.workers.shutdown(grace).await;

        if tokio::time::timeout(FLUSH_TIMEOUT, self.broadcaster.flush())
            .await
            .is_err()
        {
            tracing::warn!("pending task updates not delivered before shutdown");
        }
        self.fan_out.abort();

        tracing::info!(drained, "relay stopped");
        ShutdownReport { drained }
    }
}

const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);
