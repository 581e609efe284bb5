//! Axum router construction.
//!
//! [`build`] assembles the application router:
//! - `/` and `/langlist` (static content)
//! - `/upload` (task ingestion)
//! - `/status`, `/runTask`, `/retrieve` (task lifecycle)
//! - `/health`
//!
//! with CORS open to any origin and per-request tracing.

mod health;
mod site;
mod tasks;
mod upload;

use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::Router;
use relay_task::TaskId;
use serde::Deserialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Multipart framing allowance on top of the file size cap
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the complete [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_upload_bytes() + UPLOAD_OVERHEAD_BYTES;

    Router::new()
        .merge(site::router())
        .merge(upload::router())
        .merge(tasks::router())
        .merge(health::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer()),
        )
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any)
}

/// `?taskId=` query shared by the task endpoints
#[derive(Debug, Deserialize)]
pub(crate) struct TaskQuery {
    #[serde(rename = "taskId")]
    task_id: Option<String>,
}

impl TaskQuery {
    /// A missing or empty id is treated like an unknown one
    pub(crate) fn task_id(&self) -> Result<TaskId, crate::error::ServerError> {
        match self.task_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => Ok(TaskId::from(id)),
            _ => Err(crate::error::ServerError::NotFound(
                "missing taskId".to_owned(),
            )),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use relay_foundation::RelayConfig;
    use relay_task::LanguageCatalog;
    use tempfile::TempDir;

    /// State rooted in a temp dir, running `/bin/sh` instead of the OCR tool
    pub(crate) fn state(dir: &TempDir) -> Arc<AppState> {
        let mut config = RelayConfig {
            data_root: Some(dir.path().to_path_buf()),
            ..RelayConfig::default()
        };
        config.command.program = "/bin/sh".to_string();
        std::fs::create_dir_all(config.uploads_path()).unwrap();
        std::fs::create_dir_all(config.output_path()).unwrap();

        let languages = LanguageCatalog::from(vec!["eng".to_string(), "deu".to_string()]);
        Arc::new(AppState::new(config, languages))
    }

    pub(crate) async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
