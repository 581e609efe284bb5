//! Unified server error type.
//!
//! Handlers return `Result<T, ServerError>`; the [`IntoResponse`] impl turns
//! errors into a JSON `{"error": "..."}` body with a matching status code.
//! Internal failures are logged in full and answered with a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay_task::TaskError;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// The task is in the wrong state for the request
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

impl From<TaskError> for ServerError {
    fn from(e: TaskError) -> Self {
        if e.is_client_error() {
            debug!(error = %e, "Task request rejected");
        }
        match e {
            TaskError::NotFound(_) | TaskError::ArtifactMissing(_) => {
                ServerError::NotFound(e.to_string())
            }
            TaskError::AlreadyRunning(_) | TaskError::NotReady(_) => {
                ServerError::Conflict(e.to_string())
            }
            TaskError::InvalidFilename => ServerError::BadRequest("invalid filename".to_owned()),
            TaskError::AlreadyExists(_)
            | TaskError::InvalidTransition { .. }
            | TaskError::SpawnFailed { .. }
            | TaskError::Io(_) => ServerError::Internal(e.to_string()),
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_task::TaskId;

    fn status_of(e: TaskError) -> StatusCode {
        ServerError::from(e).into_response().status()
    }

    #[test]
    fn test_task_error_mapping() {
        let id = TaskId::from("t");
        assert_eq!(status_of(TaskError::NotFound(id.clone())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(TaskError::AlreadyRunning(id.clone())), StatusCode::CONFLICT);
        assert_eq!(status_of(TaskError::NotReady(id.clone())), StatusCode::CONFLICT);
        assert_eq!(status_of(TaskError::ArtifactMissing(id)), StatusCode::NOT_FOUND);
        assert_eq!(status_of(TaskError::InvalidFilename), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(TaskError::SpawnFailed {
                program: "ocrmypdf".into(),
                message: "No such file".into(),
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_client_errors_are_4xx() {
        let id = TaskId::from("t");
        let errors = vec![
            TaskError::NotFound(id.clone()),
            TaskError::AlreadyRunning(id.clone()),
            TaskError::NotReady(id.clone()),
            TaskError::ArtifactMissing(id.clone()),
            TaskError::InvalidFilename,
            TaskError::AlreadyExists(id),
            TaskError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk")),
        ];

        for e in errors {
            let client = e.is_client_error();
            let status = status_of(e);
            assert_eq!(client, status.is_client_error(), "{}", status);
        }
    }

    #[tokio::test]
    async fn test_internal_details_not_leaked() {
        let response = ServerError::Internal("/secret/path exploded".into()).into_response();
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "internal server error");
    }
}
