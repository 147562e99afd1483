// handlers/tasks.rs - /api/tasks/:task_id

use axum::extract::{Path, State};
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tasks::TaskPoll;

/// GET /api/tasks/:task_id - poll any task by id
pub async fn get(State(state): State<AppState>, Path(task_id): Path<Uuid>) -> ApiResult<TaskPoll> {
    state
        .status
        .queue()
        .poll(task_id)
        .await
        .map(ApiResponse::success)
        .ok_or_else(|| ApiError::task_not_found(task_id))
}
