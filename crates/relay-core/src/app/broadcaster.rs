//! Broadcaster - subscriber 集合とイベントの fan-out
//!
//! # 流れ
//! 1. 状態が変わるたびに `publish(task)` がタスクのスナップショットを
//!    bounded なイベントチャネルに積む（満杯なら publisher が待つ）
//! 2. 単一の `FanOut` ループが順番に取り出し、TaskView を組み立てて
//!    全 subscriber に `try_send` する
//!
//! ループが 1 本なので、同じタスクのイベント順序は publish 順のまま届きます。
//! 1 人の subscriber への配送失敗は他に影響しません。

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::domain::{ServerMessage, SubscriberId, Task, TaskView};
use crate::ports::ArtifactStore;

const DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

enum BusEvent {
    Update(Task),
    /// Acknowledged once every earlier event has been fanned out.
    Flush(oneshot::Sender<()>),
}

type SubscriberMap = HashMap<SubscriberId, mpsc::Sender<ServerMessage>>;

/// Renders tasks for subscribers, inlining file payloads.
#[derive(Clone)]
pub struct TaskViews {
    artifacts: Arc<dyn ArtifactStore>,
}

impl TaskViews {
    pub fn new(artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { artifacts }
    }

    /// The file is read afresh on every call. An unreadable file renders as
    /// `file: null`.
    pub async fn view(&self, task: &Task) -> TaskView {
        let data_uri = match task.forward().file() {
            Some(path) => match self.artifacts.read(path).await {
                Ok(bytes) => Some(format!("{DATA_URI_PREFIX}{}", STANDARD.encode(bytes))),
                Err(e) => {
                    tracing::warn!(task_id = %task.id(), error = %e, "cannot inline task payload");
                    None
                }
            },
            None => None,
        };
        TaskView::new(task, data_uri)
    }

    pub async fn views(&self, tasks: &[Task]) -> Vec<TaskView> {
        let mut out = Vec::with_capacity(tasks.len());
        for task in tasks {
            out.push(self.view(task).await);
        }
        out
    }
}

pub struct Broadcaster {
    subscribers: Arc<RwLock<SubscriberMap>>,
    events: mpsc::Sender<BusEvent>,
    views: TaskViews,
    subscriber_capacity: usize,
}

/// The single consumer of the event channel. Run it with `tokio::spawn`.
pub struct FanOut {
    events: mpsc::Receiver<BusEvent>,
    subscribers: Arc<RwLock<SubscriberMap>>,
    views: TaskViews,
}

impl Broadcaster {
    /// Both capacities must be non-zero.
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        event_capacity: usize,
        subscriber_capacity: usize,
    ) -> (Self, FanOut) {
        let (tx, rx) = mpsc::channel(event_capacity);
        let subscribers = Arc::new(RwLock::new(HashMap::new()));
        let views = TaskViews::new(artifacts);

        let broadcaster = Self {
            subscribers: Arc::clone(&subscribers),
            events: tx,
            views: views.clone(),
            subscriber_capacity,
        };
        let fan_out = FanOut {
            events: rx,
            subscribers,
            views,
        };
        (broadcaster, fan_out)
    }

    pub fn views(&self) -> &TaskViews {
        &self.views
    }

    /// Register a subscriber; the receiver yields every task update from now on.
    pub async fn subscribe(&self, id: SubscriberId) -> mpsc::Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(self.subscriber_capacity);
        let total = {
            let mut subscribers = self.subscribers.write().await;
            subscribers.insert(id, tx);
            subscribers.len()
        };
        tracing::info!(subscriber = %id, total, "subscriber connected");
        rx
    }

    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        let (removed, total) = {
            let mut subscribers = self.subscribers.write().await;
            let removed = subscribers.remove(&id).is_some();
            (removed, subscribers.len())
        };
        if removed {
            tracing::info!(subscriber = %id, total, "subscriber disconnected");
        }
        removed
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Queue a `task_update` for everyone. Waits while the event channel is full.
    pub async fn publish(&self, task: &Task) {
        if self.events.send(BusEvent::Update(task.clone())).await.is_err() {
            tracing::debug!(task_id = %task.id(), "fan-out stopped, update dropped");
        }
    }

    /// Wait until every event published so far has been handed to subscribers.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.events.send(BusEvent::Flush(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }
}

impl FanOut {
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            match event {
                BusEvent::Update(task) => {
                    let message = ServerMessage::TaskUpdate {
                        task: self.views.view(&task).await,
                    };
                    self.deliver(&message).await;
                }
                BusEvent::Flush(ack) => {
                    let _ = ack.send(());
                }
            }
        }
        tracing::debug!("event channel closed, fan-out finished");
    }

    async fn deliver(&self, message: &ServerMessage) {
        let subscribers = self.subscribers.read().await;
        for (id, tx) in subscribers.iter() {
            match tx.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(subscriber = %id, "subscriber buffer full, update dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(subscriber = %id, "subscriber gone, update dropped");
                }
            }
        }
    }
}
