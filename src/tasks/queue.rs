use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock, Semaphore};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::hotspot::OrchestrationError;
use crate::tasks::pipeline::Orchestrator;
use crate::tasks::state::{TaskObserver, TaskPoll, TaskRecord, TaskResult, TaskState};
use crate::types::HotspotAction;

/// In-process task queue: a bounded worker pool running orchestration
/// tasks in the background plus a result store clients poll by task id.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    orchestrator: Arc<Orchestrator>,
    records: RwLock<HashMap<Uuid, TaskRecord>>,
    slots: Semaphore,
    finished: Notify,
    result_ttl: Duration,
}

impl TaskQueue {
    pub fn new(orchestrator: Arc<Orchestrator>, config: &AppConfig) -> Self {
        let workers = config.orchestration.workers.max(1);
        tracing::info!("Task queue ready with {} workers", workers);
        Self {
            inner: Arc::new(QueueInner {
                orchestrator,
                records: RwLock::new(HashMap::new()),
                slots: Semaphore::new(workers),
                finished: Notify::new(),
                result_ttl: config.orchestration.result_ttl(),
            }),
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.inner.orchestrator
    }

    /// Schedule `action` on a hotspot and return the task id at once. The id
    /// is recorded as the hotspot's current task.
    pub async fn enqueue(&self, hotspot_id: i32, action: HotspotAction) -> Uuid {
        self.prune_expired().await;

        let task_id = Uuid::new_v4();
        self.inner
            .records
            .write()
            .await
            .insert(task_id, TaskRecord::queued(task_id, hotspot_id, action));

        if let Err(e) = self
            .inner
            .orchestrator
            .store()
            .set_current_task(hotspot_id, Some(task_id))
            .await
        {
            tracing::warn!("Could not record task {} on hotspot {}: {}", task_id, hotspot_id, e);
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let result = inner
                .orchestrator
                .run_task(task_id, hotspot_id, action, inner.as_ref(), Some(&inner.slots))
                .await;
            inner.complete(result).await;
        });

        tracing::info!(%task_id, hotspot_id, %action, "Task enqueued");
        task_id
    }

    pub async fn poll(&self, task_id: Uuid) -> Option<TaskPoll> {
        self.prune_expired().await;
        self.inner.records.read().await.get(&task_id).map(TaskPoll::from)
    }

    /// Wait until the task has a terminal result. `None` for unknown ids.
    pub async fn wait(&self, task_id: Uuid) -> Option<TaskResult> {
        loop {
            let finished = self.inner.finished.notified();
            match self.inner.records.read().await.get(&task_id) {
                None => return None,
                Some(record) => {
                    if let Some(result) = &record.result {
                        return Some(result.clone());
                    }
                }
            }
            finished.await;
        }
    }

    /// Drop finished records older than the result TTL
    pub async fn prune_expired(&self) -> usize {
        let ttl = self.inner.result_ttl;
        let mut records = self.inner.records.write().await;
        let before = records.len();
        records.retain(|_, record| match record.finished_at {
            Some(finished) => finished.elapsed() < ttl,
            None => true,
        });
        let pruned = before - records.len();
        if pruned > 0 {
            tracing::debug!("Pruned {} expired task results", pruned);
        }
        pruned
    }
}

impl QueueInner {
    async fn complete(&self, result: TaskResult) {
        if let Some(record) = self.records.write().await.get_mut(&result.task_id) {
            record.state = if result.success { TaskState::Succeeded } else { TaskState::Failed };
            record.attempts = result.attempts;
            record.finished_at = Some(Instant::now());
            record.result = Some(result);
        }
        self.finished.notify_waiters();
    }
}

#[async_trait]
impl TaskObserver for QueueInner {
    async fn on_transition(
        &self,
        task_id: Uuid,
        state: TaskState,
        attempt: u32,
        error: Option<&OrchestrationError>,
    ) {
        if let Some(record) = self.records.write().await.get_mut(&task_id) {
            record.state = state;
            record.attempts = attempt;
            if let Some(err) = error {
                record.last_error = Some(err.clone());
            }
        }
    }
}
