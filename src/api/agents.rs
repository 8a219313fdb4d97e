use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::api::state::AppState;
use crate::error::ApiError;
use crate::models::{AgentDefinition, AgentSummary, CreateAgentRequest};

// POST /api/agents
pub async fn create_agent(
    State(state): State<AppState>,
    Json(request): Json<CreateAgentRequest>,
) -> Result<(StatusCode, Json<AgentDefinition>), ApiError> {
    if request.user_requirement.trim().chars().count() < 3 {
        return Err(ApiError::bad_request(
            "user_requirement must be at least 3 characters",
        ));
    }
    let agent = state
        .factory
        .create(&request.user_requirement, request.is_composite)
        .await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

// GET /api/agents
pub async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentSummary>> {
    Json(state.store.list().await)
}

// GET /api/agents/{id}
pub async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AgentDefinition>, ApiError> {
    let agent = state.store.get(&id).await?;
    Ok(Json(agent))
}

// DELETE /api/agents/{id}
pub async fn delete_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
