pub mod agents;
pub mod state;
pub mod tasks;

pub use state::AppState;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde_json::{Value, json};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/agents", post(agents::create_agent).get(agents::list_agents))
        .route(
            "/agents/{id}",
            get(agents::get_agent).delete(agents::delete_agent),
        )
        .route("/agents/{id}/tasks", post(tasks::run_task))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
