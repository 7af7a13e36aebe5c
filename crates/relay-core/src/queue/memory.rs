//! In-memory queue: the process-wide pending / in-flight / history state.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;
use tokio::sync::{Mutex, Notify};

use super::QueueError;
use crate::domain::{Task, TaskId, TaskStatus};

/// Result of an operator removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Taken out of pending or history. Status is still the old one.
    Removed(Task),
    /// Claimed by a worker right now; nothing changed.
    Refused,
    NotFound,
}

/// Point-in-time copy of both collections.
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    /// Insertion order.
    pub pending: Vec<Task>,
    /// Most recent first.
    pub history: Vec<Task>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub history: usize,
}

struct TaskQueueState {
    pending: VecDeque<Task>,

    /// Ids a worker currently owns. A task is in at most one of
    /// `pending` / `in_flight`.
    in_flight: HashSet<TaskId>,

    history: VecDeque<Task>,
    history_cap: usize,
}

impl TaskQueueState {
    fn contains_live(&self, id: TaskId) -> bool {
        self.in_flight.contains(&id) || self.pending.iter().any(|t| t.id() == id)
    }

    fn push_history(&mut self, task: Task) {
        self.history.retain(|t| t.id() != task.id());
        self.history.push_front(task);
        self.history.truncate(self.history_cap);
    }
}

/// Pending queue + bounded history.
///
/// All mutations happen under one lock that is never held across an await,
/// so dispatch and removal of the same task observe a single order.
pub struct TaskQueue {
    state: Mutex<TaskQueueState>,
    notify: Notify,
}

impl TaskQueue {
    pub fn new(history_cap: usize) -> Self {
        Self {
            state: Mutex::new(TaskQueueState {
                pending: VecDeque::new(),
                in_flight: HashSet::new(),
                history: VecDeque::new(),
                history_cap,
            }),
            notify: Notify::new(),
        }
    }

    /// Append to pending.
    pub async fn enqueue(&self, task: Task) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock().await;
            if state.contains_live(task.id()) {
                return Err(QueueError::AlreadyQueued(task.id()));
            }
            state.pending.push_back(task);
        }
        // Notify outside the lock
        self.notify.notify_one();
        Ok(())
    }

    /// Take the oldest pending task, waiting while there is none.
    ///
    /// The returned task is marked in flight until `release` or `complete`.
    pub async fn dequeue(&self) -> Task {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(task) = state.pending.pop_front() {
                    state.in_flight.insert(task.id());
                    return task;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Drop ownership of an in-flight id (before re-enqueueing it).
    pub async fn release(&self, id: TaskId) -> bool {
        self.state.lock().await.in_flight.remove(&id)
    }

    /// Record a finished task: no longer in flight, newest history entry.
    pub async fn complete(&self, task: Task) {
        let mut state = self.state.lock().await;
        state.in_flight.remove(&task.id());
        state.push_history(task);
    }

    pub async fn remove_by_id(&self, id: TaskId) -> RemoveOutcome {
        let mut state = self.state.lock().await;

        if state.in_flight.contains(&id) {
            return RemoveOutcome::Refused;
        }

        if let Some(pos) = state.pending.iter().position(|t| t.id() == id) {
            if state.pending[pos].status() == TaskStatus::Processing {
                return RemoveOutcome::Refused;
            }
            return match state.pending.remove(pos) {
                Some(task) => RemoveOutcome::Removed(task),
                None => RemoveOutcome::NotFound,
            };
        }

        if let Some(pos) = state.history.iter().position(|t| t.id() == id) {
            return match state.history.remove(pos) {
                Some(task) => RemoveOutcome::Removed(task),
                None => RemoveOutcome::NotFound,
            };
        }

        RemoveOutcome::NotFound
    }

    /// Keep only the `cap` most recent history entries. Returns how many were dropped.
    pub async fn trim_history(&self, cap: usize) -> usize {
        let mut state = self.state.lock().await;
        let before = state.history.len();
        state.history.truncate(cap);
        before - state.history.len()
    }

    /// Keep only completed / duplicate history entries. Returns how many were dropped.
    pub async fn clear_history(&self) -> usize {
        let mut state = self.state.lock().await;
        let before = state.history.len();
        state.history.retain(|t| t.status().is_success());
        before - state.history.len()
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock().await;
        QueueSnapshot {
            pending: state.pending.iter().cloned().collect(),
            history: state.history.iter().cloned().collect(),
        }
    }

    pub async fn counts(&self) -> QueueCounts {
        let state = self.state.lock().await;
        QueueCounts {
            pending: state.pending.len(),
            in_flight: state.in_flight.len(),
            history: state.history.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::domain::Forward;
    use ulid::Ulid;

    fn task(n: u64) -> Task {
        Task::new(
            TaskId::from_ulid(Ulid::from_parts(n, 0)),
            "/bot1",
            Forward::PhotoUrl {
                url: format!("http://x/{n}.jpg"),
            },
        )
    }

    fn finished(n: u64, status: TaskStatus) -> Task {
        let mut t = task(n);
        t.transition(TaskStatus::Processing).unwrap();
        t.transition(status).unwrap();
        t
    }

    #[tokio::test]
    async fn dequeue_follows_insertion_order() {
        let queue = TaskQueue::new(21);
        for n in 1..=3 {
            queue.enqueue(task(n)).await.unwrap();
        }

        assert_eq!(queue.dequeue().await.id(), task(1).id());
        assert_eq!(queue.dequeue().await.id(), task(2).id());

        let counts = queue.counts().await;
        assert_eq!(counts, QueueCounts { pending: 1, in_flight: 2, history: 0 });
    }

    #[tokio::test]
    async fn dequeue_waits_for_enqueue() {
        let queue = Arc::new(TaskQueue::new(21));

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        queue.enqueue(task(7)).await.unwrap();
        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.id(), task(7).id());
    }

    #[tokio::test]
    async fn same_id_cannot_be_live_twice() {
        let queue = TaskQueue::new(21);
        queue.enqueue(task(1)).await.unwrap();
        assert_eq!(
            queue.enqueue(task(1)).await,
            Err(QueueError::AlreadyQueued(task(1).id()))
        );

        let claimed = queue.dequeue().await;
        assert!(queue.enqueue(task(1)).await.is_err());

        assert!(queue.release(claimed.id()).await);
        queue.enqueue(claimed).await.unwrap();
    }

    #[tokio::test]
    async fn removing_in_flight_task_is_refused_and_changes_nothing() {
        let queue = TaskQueue::new(21);
        queue.enqueue(task(1)).await.unwrap();
        queue.enqueue(task(2)).await.unwrap();
        let claimed = queue.dequeue().await;

        let before = queue.snapshot().await;
        assert_eq!(queue.remove_by_id(claimed.id()).await, RemoveOutcome::Refused);
        let after = queue.snapshot().await;

        assert_eq!(before.pending, after.pending);
        assert_eq!(before.history, after.history);
        assert_eq!(queue.counts().await.in_flight, 1);
    }

    #[tokio::test]
    async fn pending_task_marked_processing_is_refused() {
        let queue = TaskQueue::new(21);
        let mut stale = task(1);
        stale.transition(TaskStatus::Processing).unwrap();
        queue.enqueue(stale.clone()).await.unwrap();

        assert_eq!(queue.remove_by_id(stale.id()).await, RemoveOutcome::Refused);
        assert_eq!(queue.counts().await.pending, 1);
    }

    #[tokio::test]
    async fn remove_searches_pending_then_history() {
        let queue = TaskQueue::new(21);
        queue.enqueue(task(1)).await.unwrap();
        queue.complete(finished(2, TaskStatus::Failed)).await;

        assert_eq!(queue.remove_by_id(task(1).id()).await, RemoveOutcome::Removed(task(1)));
        match queue.remove_by_id(task(2).id()).await {
            RemoveOutcome::Removed(t) => assert_eq!(t.status(), TaskStatus::Failed),
            other => panic!("expected removal, got {other:?}"),
        }
        assert_eq!(queue.remove_by_id(task(3).id()).await, RemoveOutcome::NotFound);

        let snapshot = queue.snapshot().await;
        assert!(snapshot.pending.is_empty());
        assert!(snapshot.history.is_empty());
    }

    #[tokio::test]
    async fn history_is_newest_first_and_capped() {
        let queue = TaskQueue::new(21);
        for n in 1..=30 {
            queue.complete(finished(n, TaskStatus::Completed)).await;
        }

        let history = queue.snapshot().await.history;
        assert_eq!(history.len(), 21);
        assert_eq!(history[0].id(), task(30).id());
        assert_eq!(history[20].id(), task(10).id());

        assert_eq!(queue.trim_history(5).await, 16);
        assert_eq!(queue.counts().await.history, 5);
        assert_eq!(queue.trim_history(5).await, 0);
    }

    #[tokio::test]
    async fn complete_clears_in_flight() {
        let queue = TaskQueue::new(21);
        queue.enqueue(task(1)).await.unwrap();
        let mut t = queue.dequeue().await;
        t.transition(TaskStatus::Processing).unwrap();
        t.transition(TaskStatus::Duplicate).unwrap();
        queue.complete(t).await;

        assert_eq!(queue.counts().await, QueueCounts { pending: 0, in_flight: 0, history: 1 });
    }

    #[tokio::test]
    async fn clear_history_keeps_only_successes() {
        let queue = TaskQueue::new(21);
        queue.complete(finished(1, TaskStatus::Completed)).await;
        queue.complete(finished(2, TaskStatus::Failed)).await;
        queue.complete(finished(3, TaskStatus::Duplicate)).await;
        queue.complete(finished(4, TaskStatus::Failed)).await;

        assert_eq!(queue.clear_history().await, 2);
        let statuses: Vec<TaskStatus> = queue
            .snapshot()
            .await
            .history
            .iter()
            .map(Task::status)
            .collect();
        assert_eq!(statuses, vec![TaskStatus::Duplicate, TaskStatus::Completed]);
    }
}
