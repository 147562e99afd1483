use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hotspot::error::OrchestrationError;
use crate::types::HotspotAction;

/// Lifecycle of an orchestration task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Preparing,
    Executing,
    Verifying,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

/// Pipeline stages, each reported as the matching [`TaskState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Discover an interface, materialize the env file, ensure the unit
    Prepare,
    /// Issue the control operation
    Execute,
    /// Confirm the observed state and persist it
    Verify,
}

impl Stage {
    /// Stages run for an action, in order
    pub fn for_action(action: HotspotAction) -> &'static [Stage] {
        match action {
            HotspotAction::Start | HotspotAction::Restart => &[Stage::Prepare, Stage::Execute, Stage::Verify],
            HotspotAction::Stop => &[Stage::Execute, Stage::Verify],
        }
    }

    pub fn state(&self) -> TaskState {
        match self {
            Stage::Prepare => TaskState::Preparing,
            Stage::Execute => TaskState::Executing,
            Stage::Verify => TaskState::Verifying,
        }
    }
}

/// Terminal result of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: Uuid,
    pub hotspot_id: i32,
    pub action: HotspotAction,
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub duration_ms: u64,
    pub attempts: u32,
}

impl TaskResult {
    pub fn message(&self) -> String {
        match (&self.error, self.success) {
            (_, true) => format!("Hotspot {} {} completed", self.hotspot_id, self.action),
            (Some(error), false) => error.clone(),
            (None, false) => format!("Hotspot {} {} failed", self.hotspot_id, self.action),
        }
    }
}

/// Receives task state transitions as the pipeline advances
#[async_trait]
pub trait TaskObserver: Send + Sync {
    async fn on_transition(
        &self,
        task_id: Uuid,
        state: TaskState,
        attempt: u32,
        error: Option<&OrchestrationError>,
    );
}

/// Logs transitions only
pub struct LogObserver;

#[async_trait]
impl TaskObserver for LogObserver {
    async fn on_transition(
        &self,
        task_id: Uuid,
        state: TaskState,
        attempt: u32,
        error: Option<&OrchestrationError>,
    ) {
        match error {
            Some(err) => tracing::debug!(%task_id, attempt, "Task now {:?} after {}", state, err),
            None => tracing::debug!(%task_id, attempt, "Task now {:?}", state),
        }
    }
}

/// What the task store keeps about one task
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub task_id: Uuid,
    pub hotspot_id: i32,
    pub action: HotspotAction,
    pub state: TaskState,
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub last_error: Option<OrchestrationError>,
    pub result: Option<TaskResult>,
    pub finished_at: Option<tokio::time::Instant>,
}

impl TaskRecord {
    pub fn queued(task_id: Uuid, hotspot_id: i32, action: HotspotAction) -> Self {
        Self {
            task_id,
            hotspot_id,
            action,
            state: TaskState::Queued,
            attempts: 0,
            enqueued_at: Utc::now(),
            last_error: None,
            result: None,
            finished_at: None,
        }
    }
}

/// Poll view of a task for clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPoll {
    pub task_id: Uuid,
    pub hotspot_id: i32,
    pub action: HotspotAction,
    pub ready: bool,
    pub status: TaskState,
    pub success: Option<bool>,
    pub message: String,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub attempts: u32,
    pub result: Option<TaskResult>,
}

impl From<&TaskRecord> for TaskPoll {
    fn from(record: &TaskRecord) -> Self {
        let (message, error, error_code) = match (&record.result, &record.last_error) {
            (Some(result), _) => (result.message(), result.error.clone(), result.error_code.clone()),
            (None, Some(err)) => (
                format!("Attempt {} failed, retrying: {}", record.attempts, err),
                Some(err.to_string()),
                Some(err.code().to_string()),
            ),
            (None, None) => (format!("Task is {:?}", record.state).to_lowercase(), None, None),
        };

        Self {
            task_id: record.task_id,
            hotspot_id: record.hotspot_id,
            action: record.action,
            ready: record.result.is_some(),
            status: record.state,
            success: record.result.as_ref().map(|r| r.success),
            message,
            error,
            error_code,
            attempts: record.attempts,
            result: record.result.clone(),
        }
    }
}
