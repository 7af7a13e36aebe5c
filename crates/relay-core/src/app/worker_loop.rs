//! Worker loop - dispatcher と 1 タスクの実行
//!
//! # 責務
//! - `WorkerPool`: permit を取ってから dequeue し、1 タスクにつき 1 ワーカーを spawn
//! - `Worker::execute`: processing → downstream 呼び出し → 結果の反映
//!
//! # 学習ポイント
//! - permit を dequeue より先に取る: 空きワーカーが出るまでタスクは pending に残り、
//!   operator が削除できる
//! - shutdown は `watch` で通知。実行中のワーカーとバックオフは止めない
//! - drain は semaphore の permit を全部取り戻せるかで判定する

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;

use super::broadcaster::Broadcaster;
use crate::domain::{DownstreamResult, Forward, RpcRequest, Task, TaskStatus, TransportError};
use crate::ports::{ArtifactStore, Downstream, TaskStore};
use crate::queue::{RetryPolicy, TaskQueue};

/// Executes one task end-to-end. Shared by every spawned execution.
pub struct Worker {
    pub(crate) queue: Arc<TaskQueue>,
    pub(crate) store: Arc<dyn TaskStore>,
    pub(crate) artifacts: Arc<dyn ArtifactStore>,
    pub(crate) downstream: Arc<dyn Downstream>,
    pub(crate) broadcaster: Arc<Broadcaster>,
    pub(crate) retry: RetryPolicy,
    pub(crate) call_timeout: Duration,
}

impl Worker {
    /// `task` has just been dequeued, so this worker owns it until it is
    /// completed or released.
    pub async fn execute(&self, mut task: Task) {
        let id = task.id();
        if let Err(e) = task.transition(TaskStatus::Processing) {
            tracing::error!(task_id = %id, error = %e, "dequeued task cannot start");
            self.queue.release(id).await;
            return;
        }
        self.persist(&task).await;
        self.broadcaster.publish(&task).await;
        tracing::info!(task_id = %id, method = %task.method(), endpoint = task.endpoint(), retries = task.retries(), "processing task");

        match self.attempt(&task).await {
            Ok(result) => self.finish(task, result).await,
            Err(err) => self.retry(task, err).await,
        }
    }

    async fn attempt(&self, task: &Task) -> Result<DownstreamResult, TransportError> {
        let request = self.build_request(task).await?;
        let body = tokio::time::timeout(
            self.call_timeout,
            self.downstream.call(task.endpoint(), &request),
        )
        .await
        .map_err(|_| TransportError::Timeout {
            endpoint: task.endpoint().to_string(),
        })??;
        DownstreamResult::from_response(&body)
    }

    async fn build_request(&self, task: &Task) -> Result<RpcRequest, TransportError> {
        match task.forward() {
            Forward::Gif { url } => Ok(RpcRequest::post_gif(url)),
            Forward::PhotoUrl { url } => Ok(RpcRequest::post_photo(url, false)),
            Forward::PhotoFile { file } => {
                let bytes = self
                    .artifacts
                    .read(file)
                    .await
                    .map_err(|e| TransportError::Payload {
                        path: file.display().to_string(),
                        message: e.to_string(),
                    })?;
                Ok(RpcRequest::post_photo(&STANDARD.encode(bytes), true))
            }
        }
    }

    async fn finish(&self, mut task: Task, result: DownstreamResult) {
        let id = task.id();
        if let Err(e) = task.transition(result.status()) {
            tracing::error!(task_id = %id, error = %e, "cannot record downstream result");
        }

        match &result {
            DownstreamResult::Accepted => tracing::info!(task_id = %id, "task completed"),
            DownstreamResult::Duplicate => tracing::info!(task_id = %id, "downstream reported duplicate"),
            DownstreamResult::Unrecognized(value) => {
                tracing::error!(task_id = %id, result = %value, "downstream rejected task")
            }
        }

        if task.status().drops_record() {
            if let Err(e) = self.store.delete(id).await {
                tracing::error!(task_id = %id, error = %e, "cannot delete task record");
            }
        } else {
            self.persist(&task).await;
        }

        self.queue.complete(task.clone()).await;
        self.broadcaster.publish(&task).await;
    }

    async fn retry(&self, mut task: Task, err: TransportError) {
        let id = task.id();
        let retries = match task.schedule_retry() {
            Ok(retries) => retries,
            Err(e) => {
                tracing::error!(task_id = %id, error = %e, "cannot schedule retry");
                self.queue.release(id).await;
                return;
            }
        };
        self.persist(&task).await;

        let delay = self.retry.next_delay(retries);
        tracing::warn!(task_id = %id, error = %err, retries, delay_ms = delay.as_millis() as u64, "downstream call failed, retrying");
        tokio::time::sleep(delay).await;

        // publish first: once enqueued, another worker may already be running it
        self.broadcaster.publish(&task).await;
        self.queue.release(id).await;
        if let Err(e) = self.queue.enqueue(task).await {
            tracing::error!(task_id = %id, error = %e, "cannot re-enqueue task");
        }
    }

    /// Store errors inside a worker are logged; the in-memory state moves on.
    async fn persist(&self, task: &Task) {
        if let Err(e) = self.store.persist(task).await {
            tracing::error!(task_id = %task.id(), error = %e, "cannot persist task record");
        }
    }
}

/// Handle to the running dispatcher.
/// - `request_shutdown()` で dispatch ループだけ止まる
/// - `shutdown(grace)` で実行中のワーカーを最大 `grace` まで待つ
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
    permits: Arc<Semaphore>,
    size: u32,
}

impl WorkerPool {
    /// Spawn the dispatch loop for a pool of `size` workers.
    pub fn spawn(size: u32, queue: Arc<TaskQueue>, worker: Arc<Worker>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let permits = Arc::new(Semaphore::new(size as usize));

        let join = tokio::spawn(dispatch_loop(
            queue,
            worker,
            Arc::clone(&permits),
            shutdown_rx,
        ));

        Self {
            shutdown_tx,
            join,
            permits,
            size,
        }
    }

    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Stop dispatching, then wait up to `grace` for running workers.
    /// Returns `true` when every worker finished in time.
    pub async fn shutdown(self, grace: Duration) -> bool {
        self.request_shutdown();
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "dispatch loop panicked");
        }

        if grace.is_zero() {
            return self.permits.available_permits() == self.size as usize;
        }
        match tokio::time::timeout(grace, self.permits.acquire_many(self.size)).await {
            Ok(Ok(_all)) => true,
            Ok(Err(_closed)) => false,
            Err(_elapsed) => {
                let busy = self.size as usize - self.permits.available_permits();
                tracing::warn!(busy, "shutdown grace elapsed with workers still running");
                false
            }
        }
    }
}

async fn dispatch_loop(
    queue: Arc<TaskQueue>,
    worker: Arc<Worker>,
    permits: Arc<Semaphore>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tracing::debug!("dispatcher started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let permit = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_closed) => break,
            },
        };

        let task = tokio::select! {
            changed = shutdown_rx.changed() => {
                drop(permit);
                if changed.is_err() {
                    break;
                }
                continue;
            }
            task = queue.dequeue() => task,
        };

        tracing::debug!(task_id = %task.id(), "dispatching task");
        let worker = Arc::clone(&worker);
        tokio::spawn(async move {
            // permit は実行が終わるまで保持
            let _permit = permit;
            worker.execute(task).await;
        });
    }
    tracing::debug!("dispatcher stopped");
}
