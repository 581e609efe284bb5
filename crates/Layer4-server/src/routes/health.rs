//! Health / heartbeat endpoint.

use crate::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

/// Returns `{"status": "ok", "tasks": <count>}`.
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "tasks": state.tasks.task_count(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_health_reports_task_count() {
        let dir = TempDir::new().unwrap();
        let state = test_support::state(&dir);
        let Json(body) = get_health(State(state)).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["tasks"], 0);
    }
}
