//! # relay-task
//!
//! Task lifecycle and PTY-backed execution for PtyRelay.
//!
//! ## Features
//!
//! - Concurrency-safe task registry with an enforced status machine
//! - Program execution under a pseudo-terminal
//! - Output drained as base64 events, finalized only after the drain completes
//! - Client disconnect kills the running process
//! - Periodic expiry sweep of records and their files

pub mod artifact;
pub mod catalog;
pub mod command;
pub mod error;
pub mod executor;
pub mod manager;
pub mod orchestrator;
pub mod registry;
pub mod state;
pub mod stream;
pub mod sweeper;
pub mod task;

// Task system
pub use error::{Result, TaskError};
pub use manager::{Artifact, TaskManager, TaskManagerConfig};
pub use registry::TaskRegistry;
pub use state::TaskStatus;
pub use task::{expiry_after, NewTask, TaskId, TaskOptions, TaskRecord};

// Execution
pub use command::{CommandLine, TERM_ENV};
pub use executor::{ProcessExit, PtyExecutor, PtyProcess, PtySizeConfig};
pub use orchestrator::{Execution, OrchestratorConfig, TaskOrchestrator, TaskOutcome};
pub use stream::{DrainEnd, DrainSummary, OutputEvent, OutputStreamer, PTY_STREAM_LABEL};

// Housekeeping
pub use artifact::remove_artifact;
pub use catalog::LanguageCatalog;
pub use sweeper::{ExpirySweeper, SweepReport};
