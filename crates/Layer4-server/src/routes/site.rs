//! Static front page and the installed-language list.

use crate::error::ServerError;
use crate::state::AppState;
use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use relay_task::LanguageCatalog;
use std::io::ErrorKind;
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(index))
        .route("/langlist", get(language_list))
}

/// Serves the configured `index.html`, read on every request
pub async fn index(State(state): State<Arc<AppState>>) -> Result<Html<String>, ServerError> {
    match tokio::fs::read_to_string(&state.index_path).await {
        Ok(page) => Ok(Html(page)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(ServerError::NotFound("index page not found".to_owned()))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn language_list(State(state): State<Arc<AppState>>) -> Json<LanguageCatalog> {
    Json(state.languages.clone())
}
