//! Task lifecycle endpoints: status polling, execution and retrieval.

use crate::error::ServerError;
use crate::routes::TaskQuery;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use relay_task::{Execution, TaskError, TaskStatus};
use serde::Serialize;
use std::io::ErrorKind;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::ReaderStream;
use tracing::info;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(task_status))
        .route("/runTask", get(run_task))
        .route("/retrieve", get(retrieve))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: TaskStatus,
}

/// `{"status": <code>}`
pub async fn task_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TaskQuery>,
) -> Result<Json<StatusResponse>, ServerError> {
    let id = query.task_id()?;
    let status = state.tasks.status(&id)?;
    Ok(Json(StatusResponse { status }))
}

/// Start the task and stream its terminal output as server-sent events.
///
/// Closing the connection kills the process. The stream ends with a
/// `{"type":"status"}` event once the task is finalized.
pub async fn run_task(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TaskQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ServerError> {
    let id = query.task_id()?;
    info!(task_id = %id, "Client connected, starting task");

    let Execution { events, .. } = state.tasks.execute(&id).await?;
    let stream = ReceiverStream::new(events).map(|event| Event::default().json_data(event));
    Ok(Sse::new(stream))
}

/// Download the finished artifact as `<prefix><filename>`
pub async fn retrieve(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TaskQuery>,
) -> Result<Response, ServerError> {
    let id = query.task_id()?;
    let artifact = state.tasks.artifact(&id).await?;

    let file = match tokio::fs::File::open(&artifact.path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(TaskError::ArtifactMissing(id).into())
        }
        Err(e) => return Err(e.into()),
    };

    let disposition = format!("attachment; filename=\"{}\"", artifact.download_name);
    let disposition = HeaderValue::from_bytes(disposition.as_bytes())
        .map_err(|e| ServerError::Internal(format!("invalid download name: {e}")))?;

    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        ),
        (header::CONTENT_DISPOSITION, disposition),
        (header::CONTENT_LENGTH, HeaderValue::from(artifact.size)),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::routes::upload::sanitize_filename;
    use crate::routes::{build, test_support};
    use axum::http::{Request, StatusCode};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use relay_task::{NewTask, TaskId, TaskOptions};
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const SCRIPT: &str = "printf 'working\\n'; cp \"$0\" \"$1\"\n";

    fn submit(state: &AppState, script: &str, filename: &str) -> TaskId {
        let id = TaskId::generate();
        let source_path = state.uploads_dir.join(id.as_str());
        std::fs::write(&source_path, script).unwrap();
        state
            .tasks
            .create_task(
                id.clone(),
                NewTask {
                    filename: filename.to_string(),
                    source_path,
                    options: TaskOptions::default(),
                },
            )
            .unwrap()
    }

    async fn get(app: Router, uri: &str) -> Response {
        app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    /// `data:` payloads of an SSE body
    fn sse_events(body: &[u8]) -> Vec<Value> {
        String::from_utf8_lossy(body)
            .lines()
            .filter_map(|line| line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let dir = TempDir::new().unwrap();
        let state = test_support::state(&dir);
        let id = submit(&state, SCRIPT, "report.pdf");

        let status = get(build(Arc::clone(&state)), &format!("/status?taskId={}", id)).await;
        assert_eq!(status.status(), StatusCode::OK);
        assert_eq!(test_support::body_json(status).await["status"], 0);

        let run = get(build(Arc::clone(&state)), &format!("/runTask?taskId={}", id)).await;
        assert_eq!(run.status(), StatusCode::OK);
        assert_eq!(
            run.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        let body = axum::body::to_bytes(run.into_body(), usize::MAX).await.unwrap();
        let events = sse_events(&body);

        let (last, outputs) = events.split_last().unwrap();
        assert_eq!(last["type"], "status");
        assert_eq!(last["status"], 2);

        let mut output = Vec::new();
        for event in outputs {
            assert_eq!(event["type"], "output");
            assert_eq!(event["stream"], "pty");
            output.extend(STANDARD.decode(event["data_b64"].as_str().unwrap()).unwrap());
        }
        assert!(String::from_utf8_lossy(&output).contains("working"));

        let status = get(build(Arc::clone(&state)), &format!("/status?taskId={}", id)).await;
        assert_eq!(test_support::body_json(status).await["status"], 2);

        let download = get(build(Arc::clone(&state)), &format!("/retrieve?taskId={}", id)).await;
        assert_eq!(download.status(), StatusCode::OK);
        assert_eq!(
            download.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"ocr_report.pdf\""
        );
        let bytes = axum::body::to_bytes(download.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], SCRIPT.as_bytes());
    }

    #[tokio::test]
    async fn test_retrieve_with_control_characters_in_name() {
        let dir = TempDir::new().unwrap();
        let state = test_support::state(&dir);
        let name = sanitize_filename("scan\r\nSet-Cookie: x.pdf");
        let id = submit(&state, SCRIPT, &name);

        let run = get(build(Arc::clone(&state)), &format!("/runTask?taskId={}", id)).await;
        let body = axum::body::to_bytes(run.into_body(), usize::MAX).await.unwrap();
        assert_eq!(sse_events(&body).last().unwrap()["status"], 2);

        let download = get(build(Arc::clone(&state)), &format!("/retrieve?taskId={}", id)).await;
        assert_eq!(download.status(), StatusCode::OK);
        assert_eq!(
            download.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"ocr_scan__Set-Cookie_ x.pdf\""
        );
    }

    #[tokio::test]
    async fn test_unknown_task_is_404() {
        let dir = TempDir::new().unwrap();
        let state = test_support::state(&dir);

        for path in ["/status", "/runTask", "/retrieve"] {
            let response = get(build(Arc::clone(&state)), &format!("{}?taskId=nope", path)).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", path);

            let response = get(build(Arc::clone(&state)), path).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{} without id", path);
        }
    }

    #[tokio::test]
    async fn test_retrieve_before_success_is_conflict() {
        let dir = TempDir::new().unwrap();
        let state = test_support::state(&dir);
        let id = submit(&state, SCRIPT, "report.pdf");

        let response = get(build(state), &format!("/retrieve?taskId={}", id)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(test_support::body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_second_run_is_conflict() {
        let dir = TempDir::new().unwrap();
        let state = test_support::state(&dir);
        let id = submit(&state, "sleep 1; cp \"$0\" \"$1\"\n", "report.pdf");

        let first = get(build(Arc::clone(&state)), &format!("/runTask?taskId={}", id)).await;
        assert_eq!(first.status(), StatusCode::OK);

        let second = get(build(Arc::clone(&state)), &format!("/runTask?taskId={}", id)).await;
        assert_eq!(second.status(), StatusCode::CONFLICT);

        let body = axum::body::to_bytes(first.into_body(), usize::MAX).await.unwrap();
        assert_eq!(sse_events(&body).last().unwrap()["status"], 2);
    }

    #[tokio::test]
    async fn test_dropped_stream_fails_task() {
        let dir = TempDir::new().unwrap();
        let state = test_support::state(&dir);
        let id = submit(&state, "printf started; sleep 30\n", "report.pdf");
        let source_path = state.tasks.get(&id).unwrap().source_path;

        let response = get(build(Arc::clone(&state)), &format!("/runTask?taskId={}", id)).await;
        assert_eq!(response.status(), StatusCode::OK);
        drop(response);

        let mut status = TaskStatus::Running;
        for _ in 0..100 {
            status = state.tasks.status(&id).unwrap();
            if status != TaskStatus::Running {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        assert_eq!(status, TaskStatus::Failed);
        assert!(!source_path.exists());
    }
}
