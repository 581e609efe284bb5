//! Task Manager - entry point for the HTTP layer
//!
//! Owns the registry and orchestrator and applies the lifecycle TTLs:
//! creation, completion (inside the orchestrator) and retrieval.

use crate::error::{Result, TaskError};
use crate::orchestrator::{Execution, OrchestratorConfig, TaskOrchestrator};
use crate::registry::TaskRegistry;
use crate::state::TaskStatus;
use crate::task::{expiry_after, NewTask, TaskId, TaskRecord};
use relay_foundation::{RelayConfig, TtlConfig};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Task manager configuration
#[derive(Debug, Clone)]
pub struct TaskManagerConfig {
    pub ttl: TtlConfig,

    /// Directory produced artifacts are written to
    pub output_dir: PathBuf,

    /// Prepended to the filename offered on download
    pub output_prefix: String,

    pub orchestrator: OrchestratorConfig,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            ttl: TtlConfig::default(),
            output_dir: PathBuf::from("output"),
            output_prefix: "ocr_".to_string(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

impl TaskManagerConfig {
    pub fn from_relay(config: &RelayConfig) -> Self {
        Self {
            ttl: config.ttl.clone(),
            output_dir: config.output_path(),
            output_prefix: config.command.output_prefix.clone(),
            orchestrator: OrchestratorConfig::from_relay(config),
        }
    }
}

/// A finished artifact ready for download
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub download_name: String,
    pub size: u64,
}

/// Task manager
#[derive(Debug)]
pub struct TaskManager {
    registry: Arc<TaskRegistry>,
    orchestrator: TaskOrchestrator,
    config: TaskManagerConfig,
}

impl TaskManager {
    pub fn new(config: TaskManagerConfig) -> Self {
        Self::with_registry(Arc::new(TaskRegistry::new()), config)
    }

    pub fn with_registry(registry: Arc<TaskRegistry>, config: TaskManagerConfig) -> Self {
        let orchestrator = TaskOrchestrator::new(Arc::clone(&registry), config.orchestrator.clone());
        Self {
            registry,
            orchestrator,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    /// Where the artifact for a task will be written
    pub fn output_path_for(&self, id: &TaskId, filename: &str) -> PathBuf {
        self.config.output_dir.join(format!(
            "{}-{}{}",
            id, self.config.output_prefix, filename
        ))
    }

    /// Register an uploaded source as a new pending task
    pub fn create_task(&self, id: TaskId, task: NewTask) -> Result<TaskId> {
        if task.filename.trim().is_empty() {
            return Err(TaskError::InvalidFilename);
        }

        let output_path = self.output_path_for(&id, &task.filename);
        let record = TaskRecord::new(task, output_path, self.config.ttl.created());
        self.registry.create(id.clone(), record)?;

        info!(task_id = %id, "Task submitted");
        Ok(id)
    }

    pub fn get(&self, id: &TaskId) -> Result<TaskRecord> {
        self.registry.get(id)
    }

    pub fn status(&self, id: &TaskId) -> Result<TaskStatus> {
        self.registry.status(id)
    }

    pub fn task_count(&self) -> usize {
        self.registry.len()
    }

    pub async fn execute(&self, id: &TaskId) -> Result<Execution> {
        self.orchestrator.execute(id).await
    }

    /// Locate the finished artifact and push the expiry out by the retrieval TTL
    pub async fn artifact(&self, id: &TaskId) -> Result<Artifact> {
        let record = self.registry.get(id)?;
        if record.status != TaskStatus::Succeeded {
            return Err(TaskError::NotReady(id.clone()));
        }

        let metadata = match tokio::fs::metadata(&record.output_path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TaskError::ArtifactMissing(id.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        self.registry
            .extend_expiry(id, expiry_after(self.config.ttl.retrieved()))?;
        debug!(task_id = %id, size = metadata.len(), "Artifact retrieved");

        Ok(Artifact {
            download_name: record.download_name(&self.config.output_prefix),
            path: record.output_path,
            size: metadata.len(),
        })
    }
}
