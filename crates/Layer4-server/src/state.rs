//! Shared application state injected into every handler.

use relay_foundation::RelayConfig;
use relay_task::{LanguageCatalog, TaskManager, TaskManagerConfig};
use std::path::PathBuf;
use std::sync::Arc;

pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub tasks: Arc<TaskManager>,
    /// Probed once at startup
    pub languages: LanguageCatalog,
    pub uploads_dir: PathBuf,
    pub index_path: PathBuf,
}

impl AppState {
    pub fn new(config: RelayConfig, languages: LanguageCatalog) -> Self {
        let tasks = TaskManager::new(TaskManagerConfig::from_relay(&config));
        Self {
            uploads_dir: config.uploads_path(),
            index_path: config.index_path(),
            config: Arc::new(config),
            tasks: Arc::new(tasks),
            languages,
        }
    }

    /// Whether `name` is a configured toggle option
    pub fn is_toggle(&self, name: &str) -> bool {
        self.config.command.toggle_names().any(|t| t == name)
    }
}
