//! Join barrier over the collector tasks of one scrape.

use std::collections::HashMap;
use std::future::Future;

use tokio::task::{self, JoinSet};

use crate::collector::CollectorKind;

/// How a collector task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// The task ran to completion (its own result already handled).
    Finished,
    /// The task panicked; the panic was contained here.
    Panicked,
    /// The task was aborted before finishing.
    Aborted,
}

/// Final report for one collector task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskReport {
    pub kind: CollectorKind,
    pub status: TaskStatus,
}

/// Counts down as collector tasks terminate and releases the waiter once
/// every registered task is gone.
///
/// Tasks are spawned onto an owned [`JoinSet`], so every spawn is registered
/// before it can complete and dropping the barrier aborts whatever is still
/// running.
#[derive(Debug, Default)]
pub struct JoinBarrier {
    tasks: JoinSet<()>,
    kinds: HashMap<task::Id, CollectorKind>,
}

impl JoinBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a collector task and count it.
    pub fn spawn<F>(&mut self, kind: CollectorKind, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.tasks.spawn(fut);
        self.kinds.insert(handle.id(), kind);
    }

    /// Number of tasks still outstanding.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait until every task has terminated, in whatever way.
    ///
    /// Returns immediately with an empty report when nothing was spawned.
    /// Reports are in completion order.
    pub async fn wait(mut self) -> Vec<TaskReport> {
        let mut reports = Vec::with_capacity(self.tasks.len());

        while let Some(joined) = self.tasks.join_next_with_id().await {
            let (id, status) = match joined {
                Ok((id, ())) => (id, TaskStatus::Finished),
                Err(e) if e.is_panic() => (e.id(), TaskStatus::Panicked),
                Err(e) => (e.id(), TaskStatus::Aborted),
            };

            let Some(kind) = self.kinds.remove(&id) else {
                tracing::warn!(task_id = %id, "Joined a task the barrier did not register");
                continue;
            };

            match status {
                TaskStatus::Finished => {
                    tracing::trace!(collector = %kind, "Collector task joined")
                }
                TaskStatus::Panicked => {
                    tracing::error!(collector = %kind, "Collector task panicked")
                }
                TaskStatus::Aborted => tracing::warn!(collector = %kind, "Collector task aborted"),
            }

            reports.push(TaskReport { kind, status });
        }

        reports
    }
}
