//! Task Orchestrator - runs one execution of a task end to end
//!
//! ## Flow
//!
//! 1. Claim the task (`Pending|Failed -> Running`) in the registry
//! 2. Spawn the configured tool under a PTY
//! 3. Drain output into the event channel while waiting for the process
//! 4. Race "process exited and output drained" against the client going away
//! 5. Finalize: release the PTY, record the status, remove the source file
//!
//! ```ignore
//! let orchestrator = TaskOrchestrator::new(registry, OrchestratorConfig::default());
//! let mut execution = orchestrator.execute(&task_id).await?;
//!
//! while let Some(event) = execution.events.recv().await {
//!     send_to_client(event.to_json()?);
//! }
//! let outcome = execution.outcome.await?;
//! ```

use crate::artifact::discard_artifact;
use crate::command::CommandLine;
use crate::error::{Result, TaskError};
use crate::executor::{ChildWaiter, ProcessExit, ProcessKiller, PtyExecutor, PtyMaster, PtySizeConfig};
use crate::registry::TaskRegistry;
use crate::state::TaskStatus;
use crate::stream::{DrainSummary, OutputEvent, OutputStreamer};
use crate::task::{expiry_after, TaskId};
use relay_foundation::{CommandConfig, RelayConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

// ============================================================================
// Config
// ============================================================================

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How task attributes become a command line
    pub command: CommandConfig,

    /// Initial terminal geometry
    pub pty_size: PtySizeConfig,

    /// Upper bound on waiting for a killed process; `None` waits indefinitely
    pub kill_grace: Option<Duration>,

    /// Expiry applied when an execution finishes
    pub completed_ttl: Duration,

    /// Events buffered between the drain and the client
    pub channel_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            command: CommandConfig::default(),
            pty_size: PtySizeConfig::default(),
            kill_grace: None,
            completed_ttl: Duration::from_secs(10 * 60),
            channel_capacity: 64,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_relay(config: &RelayConfig) -> Self {
        Self {
            command: config.command.clone(),
            pty_size: PtySizeConfig::from(&config.pty),
            kill_grace: config.pty.kill_grace(),
            completed_ttl: config.ttl.completed(),
            ..Self::default()
        }
    }
}

// ============================================================================
// Execution
// ============================================================================

/// A started execution
#[derive(Debug)]
pub struct Execution {
    pub task_id: TaskId,

    /// Output events, then one closing status event. Dropping the receiver
    /// counts as a client disconnect.
    pub events: mpsc::Receiver<OutputEvent>,

    /// Resolves after finalization
    pub outcome: JoinHandle<TaskOutcome>,
}

/// How an execution ended
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub status: TaskStatus,

    /// `None` if the kill grace elapsed before the process was reaped
    pub exit: Option<ProcessExit>,

    /// The client went away before completion
    pub disconnected: bool,

    pub drain: Option<DrainSummary>,
}

// ============================================================================
// Task Orchestrator
// ============================================================================

/// Runs task executions against the shared registry
#[derive(Debug, Clone)]
pub struct TaskOrchestrator {
    registry: Arc<TaskRegistry>,
    executor: PtyExecutor,
    config: OrchestratorConfig,
}

impl TaskOrchestrator {
    pub fn new(registry: Arc<TaskRegistry>, config: OrchestratorConfig) -> Self {
        Self {
            registry,
            executor: PtyExecutor::new(),
            config,
        }
    }

    /// Start executing `id`.
    ///
    /// Fails with `NotFound`, `AlreadyRunning` or `SpawnFailed` before any
    /// event is produced; a spawn failure still finalizes the task as failed.
    pub async fn execute(&self, id: &TaskId) -> Result<Execution> {
        let record = self.registry.begin_execution(id)?;
        let command = CommandLine::for_task(&self.config.command, &record);
        let finalizer = Finalizer {
            registry: Arc::clone(&self.registry),
            task_id: id.clone(),
            source_path: record.source_path.clone(),
            output_path: record.output_path.clone(),
            completed_ttl: self.config.completed_ttl,
        };

        let process = match self.executor.spawn(&command, self.config.pty_size) {
            Ok(process) => process,
            Err(e) => {
                error!(task_id = %id, "Failed to start task: {}", e);
                finalizer.finish(TaskStatus::Failed, None).await;
                return Err(e);
            }
        };

        process.resize(self.config.pty_size);
        let parts = process.into_parts();

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let drained = OutputStreamer::new(id.clone(), tx.clone()).spawn(parts.reader);

        let supervision = Supervision {
            master: parts.master,
            waiter: parts.waiter,
            killer: parts.killer,
            drained,
            sink: tx,
            kill_grace: self.config.kill_grace,
        };
        let outcome = tokio::spawn(supervision.run(finalizer));

        info!(task_id = %id, "Task execution started");
        Ok(Execution {
            task_id: id.clone(),
            events: rx,
            outcome,
        })
    }
}

// ============================================================================
// Supervision
// ============================================================================

struct Supervision {
    master: PtyMaster,
    waiter: ChildWaiter,
    killer: ProcessKiller,
    drained: oneshot::Receiver<DrainSummary>,
    sink: mpsc::Sender<OutputEvent>,
    kill_grace: Option<Duration>,
}

impl Supervision {
    async fn run(self, finalizer: Finalizer) -> TaskOutcome {
        let Supervision {
            master,
            waiter,
            mut killer,
            drained,
            sink,
            kill_grace,
        } = self;
        let task_id = finalizer.task_id.clone();

        // Exit first, then the drain; never finalize with output still pending
        let completion = async move {
            let exit = match tokio::task::spawn_blocking(move || waiter.wait()).await {
                Ok(exit) => exit,
                Err(e) => {
                    warn!("Process wait task failed: {}", e);
                    ProcessExit::unknown()
                }
            };
            let drain = drained.await.ok();
            (exit, drain)
        };
        tokio::pin!(completion);

        let (exit, drain, disconnected) = tokio::select! {
            biased;
            (exit, drain) = &mut completion => (Some(exit), drain, false),
            _ = sink.closed() => {
                info!(task_id = %task_id, pid = ?killer.pid(), "Client disconnected, killing process");
                if let Err(e) = killer.kill() {
                    warn!(task_id = %task_id, "Failed to kill process: {}", e);
                }

                match kill_grace {
                    Some(grace) => match tokio::time::timeout(grace, &mut completion).await {
                        Ok((exit, drain)) => (Some(exit), drain, true),
                        Err(_) => {
                            warn!(task_id = %task_id, "Process still running {:?} after kill", grace);
                            (None, None, true)
                        }
                    },
                    None => {
                        let (exit, drain) = (&mut completion).await;
                        (Some(exit), drain, true)
                    }
                }
            }
        };

        let succeeded = !disconnected && exit.map(|e| e.success).unwrap_or(false);
        let status = if succeeded {
            TaskStatus::Succeeded
        } else {
            TaskStatus::Failed
        };

        drop(master);
        finalizer.finish(status, exit.and_then(|e| e.code)).await;

        if sink.send(OutputEvent::status(status)).await.is_err() {
            debug!(task_id = %task_id, "Status event not delivered");
        }

        info!(
            task_id = %task_id,
            status = %status,
            exit_code = ?exit.and_then(|e| e.code),
            disconnected,
            "Task execution finished"
        );

        TaskOutcome {
            status,
            exit,
            disconnected,
            drain,
        }
    }
}

// ============================================================================
// Finalization
// ============================================================================

struct Finalizer {
    registry: Arc<TaskRegistry>,
    task_id: TaskId,
    source_path: PathBuf,
    output_path: PathBuf,
    completed_ttl: Duration,
}

impl Finalizer {
    /// Record the final status and consume the source artifact
    async fn finish(&self, status: TaskStatus, exit_code: Option<u32>) {
        match self.registry.finish_execution(
            &self.task_id,
            status,
            exit_code,
            expiry_after(self.completed_ttl),
        ) {
            Ok(()) => {}
            Err(TaskError::NotFound(_)) => {
                // Nothing can reclaim the output of a record that is gone
                debug!(task_id = %self.task_id, "Task removed before it finished");
                discard_artifact(&self.output_path).await;
            }
            Err(e) => {
                error!(task_id = %self.task_id, "Failed to record task status: {}", e);
            }
        }
        discard_artifact(&self.source_path).await;
    }
}
