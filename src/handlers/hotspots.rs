// handlers/hotspots.rs - /api/hotspots/:id/* handlers

use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::{Diagnostics, StatusReport, VerifyReport};
use crate::tasks::TaskPoll;
use crate::types::HotspotAction;

#[derive(Debug, Serialize, Deserialize)]
pub struct Enqueued {
    pub task_id: Uuid,
    pub hotspot_id: i32,
    pub action: HotspotAction,
}

#[derive(Debug, Deserialize)]
pub struct TaskStatusQuery {
    pub task_id: Option<Uuid>,
}

/// POST /api/hotspots/:id/start
pub async fn start(state: State<AppState>, path: Path<i32>) -> ApiResult<Enqueued> {
    enqueue(state, path, HotspotAction::Start).await
}

/// POST /api/hotspots/:id/stop
pub async fn stop(state: State<AppState>, path: Path<i32>) -> ApiResult<Enqueued> {
    enqueue(state, path, HotspotAction::Stop).await
}

/// POST /api/hotspots/:id/restart
pub async fn restart(state: State<AppState>, path: Path<i32>) -> ApiResult<Enqueued> {
    enqueue(state, path, HotspotAction::Restart).await
}

async fn enqueue(
    State(state): State<AppState>,
    Path(hotspot_id): Path<i32>,
    action: HotspotAction,
) -> ApiResult<Enqueued> {
    // Refuse unknown hotspots up front rather than queueing a doomed task
    if state.status.queue().orchestrator().store().get(hotspot_id).await?.is_none() {
        return Err(ApiError::not_found(format!("Hotspot {} not found", hotspot_id)));
    }

    let task_id = state.status.queue().enqueue(hotspot_id, action).await;
    Ok(ApiResponse::accepted(Enqueued {
        task_id,
        hotspot_id,
        action,
    }))
}

/// GET /api/hotspots/:id/status - observe and self-heal is_active
pub async fn status(State(state): State<AppState>, Path(hotspot_id): Path<i32>) -> ApiResult<StatusReport> {
    Ok(ApiResponse::success(state.status.probe(hotspot_id).await?))
}

/// GET /api/hotspots/:id/verify
pub async fn verify(State(state): State<AppState>, Path(hotspot_id): Path<i32>) -> ApiResult<VerifyReport> {
    Ok(ApiResponse::success(state.status.verify(hotspot_id).await?))
}

/// GET /api/hotspots/:id/diagnostics
pub async fn diagnostics(State(state): State<AppState>, Path(hotspot_id): Path<i32>) -> ApiResult<Diagnostics> {
    Ok(ApiResponse::success(state.status.diagnostics(hotspot_id).await?))
}

/// GET /api/hotspots/:id/task_status[?task_id=]
pub async fn task_status(
    State(state): State<AppState>,
    Path(hotspot_id): Path<i32>,
    Query(query): Query<TaskStatusQuery>,
) -> ApiResult<TaskPoll> {
    match state.status.task_status(hotspot_id, query.task_id).await? {
        Some(poll) => Ok(ApiResponse::success(poll)),
        None => match query.task_id {
            Some(task_id) => Err(ApiError::task_not_found(task_id)),
            None => Err(ApiError::TaskNotFound(format!(
                "Hotspot {} has no current task",
                hotspot_id
            ))),
        },
    }
}
