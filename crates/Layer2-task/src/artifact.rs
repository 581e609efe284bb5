//! Source and output artifact files

use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, warn};

/// Remove an artifact file. Returns `Ok(false)` if it was already gone.
pub async fn remove_artifact(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed artifact");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Like [`remove_artifact`] but logs instead of failing
pub async fn discard_artifact(path: &Path) -> bool {
    match remove_artifact(path).await {
        Ok(removed) => removed,
        Err(e) => {
            warn!(path = %path.display(), "Failed to remove artifact: {}", e);
            false
        }
    }
}
