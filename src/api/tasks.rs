use axum::{
    Json,
    extract::{Path, State},
};

use crate::api::state::AppState;
use crate::error::ApiError;
use crate::models::{RunTaskRequest, TaskResult};

// POST /api/agents/{id}/tasks
pub async fn run_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RunTaskRequest>,
) -> Result<Json<TaskResult>, ApiError> {
    if request.task.trim().chars().count() < 3 {
        return Err(ApiError::bad_request("task must be at least 3 characters"));
    }
    let agent = state.store.get(&id).await?;
    let result = state.runner.run(&agent, &request.task).await;
    Ok(Json(result))
}
