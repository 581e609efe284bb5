//! Task ingestion.
//!
//! `POST /upload` takes a multipart form:
//!
//! | field      | meaning                                   |
//! |------------|-------------------------------------------|
//! | `file`     | the document to process                   |
//! | `name`     | display filename (falls back to the file's own name) |
//! | `language` | repeatable language hint                  |
//! | toggles    | `deskew`, `rotate`, `force` set to `on`    |
//!
//! The file is streamed to `<uploads>/<taskId>` and a pending task is created.

use crate::error::ServerError;
use crate::state::AppState;
use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use regex::Regex;
use relay_task::artifact::discard_artifact;
use relay_task::{NewTask, TaskId, TaskOptions};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

const MAX_FILENAME_BYTES: usize = 255;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/upload", post(upload))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub task_id: TaskId,
}

#[derive(Debug, Default)]
struct UploadForm {
    name: Option<String>,
    file_name: Option<String>,
    file_size: Option<u64>,
    languages: Vec<String>,
    toggles: Vec<String>,
}

pub async fn upload(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    let id = TaskId::generate();
    let source_path = state.uploads_dir.join(id.as_str());

    match ingest(&state, &id, &source_path, multipart).await {
        Ok(()) => Ok(Json(UploadResponse { task_id: id })),
        Err(e) => {
            discard_artifact(&source_path).await;
            Err(e)
        }
    }
}

async fn ingest(
    state: &AppState,
    id: &TaskId,
    source_path: &Path,
    mut multipart: Multipart,
) -> Result<(), ServerError> {
    let max_bytes = state.config.max_upload_bytes();
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Failed to read multipart field: {e}")))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                if form.file_size.is_some() {
                    return Err(ServerError::BadRequest("more than one file uploaded".into()));
                }
                form.file_name = field.file_name().map(str::to_string);
                form.file_size = Some(store_file(field, source_path, max_bytes).await?);
            }
            "name" => form.name = Some(field_text(field).await?),
            "language" => form.languages.push(field_text(field).await?),
            name if state.is_toggle(name) => {
                if field_text(field).await? == "on" {
                    form.toggles.push(name.to_string());
                }
            }
            other => debug!(field = %other, "Ignoring unknown upload field"),
        }
    }

    let Some(size) = form.file_size else {
        return Err(ServerError::BadRequest("no file uploaded".into()));
    };

    let filename = sanitize_filename(form.name.or(form.file_name).as_deref().unwrap_or_default());
    if filename.is_empty() {
        return Err(ServerError::BadRequest("invalid filename".into()));
    }

    let options = form
        .toggles
        .into_iter()
        .fold(TaskOptions::default().with_languages(&form.languages), |options, toggle| {
            options.with_toggle(toggle)
        });

    state.tasks.create_task(
        id.clone(),
        NewTask {
            filename: filename.clone(),
            source_path: source_path.to_path_buf(),
            options,
        },
    )?;

    info!(task_id = %id, filename = %filename, size_bytes = size, "Upload stored");
    Ok(())
}

async fn field_text(field: Field<'_>) -> Result<String, ServerError> {
    field
        .text()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Failed to read multipart field: {e}")))
}

/// Stream a file field to disk, enforcing the size cap
async fn store_file(mut field: Field<'_>, path: &Path, max_bytes: usize) -> Result<u64, ServerError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0usize;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Failed to read file chunk: {e}")))?
    {
        written += chunk.len();
        if written > max_bytes {
            return Err(ServerError::BadRequest(format!(
                "File too large: exceeds maximum of {} bytes",
                max_bytes
            )));
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(written as u64)
}

fn invalid_chars() -> &'static Regex {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    INVALID.get_or_init(|| Regex::new(r#"[<>:"/\\|?*\p{Cc}]"#).expect("filename pattern is valid"))
}

/// Trim whitespace, replace characters unsafe in filenames or headers
/// (including control characters) with `_` and cap the length at 255 bytes
/// without splitting a character.
pub fn sanitize_filename(input: &str) -> String {
    let replaced = invalid_chars().replace_all(input.trim(), "_");
    let trimmed: &str = &replaced;

    if trimmed.len() <= MAX_FILENAME_BYTES {
        return trimmed.to_string();
    }
    let mut end = MAX_FILENAME_BYTES;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}
