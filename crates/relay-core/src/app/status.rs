//! Status views - `get_tasks` の応答と運用ログ向けの集計

use serde::Serialize;

use super::broadcaster::TaskViews;
use crate::domain::ServerMessage;
use crate::queue::{QueueCounts, TaskQueue};

/// `task_list` frame: pending in insertion order, history newest first.
pub async fn task_list(queue: &TaskQueue, views: &TaskViews) -> ServerMessage {
    let snapshot = queue.snapshot().await;
    ServerMessage::TaskList {
        queued: views.views(&snapshot.pending).await,
        processed: views.views(&snapshot.history).await,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStatus {
    #[serde(flatten)]
    pub queue: QueueCounts,
    pub subscribers: usize,
}

impl RelayStatus {
    pub fn log(&self) {
        tracing::info!(
            pending = self.queue.pending,
            in_flight = self.queue.in_flight,
            history = self.queue.history,
            subscribers = self.subscribers,
            "relay status"
        );
    }
}
