//! Task executors
//!
//! - `PtyExecutor` - runs the configured tool attached to a pseudo-terminal

pub mod pty;

pub use pty::{
    ChildWaiter, ProcessExit, ProcessKiller, PtyExecutor, PtyMaster, PtyParts, PtyProcess,
    PtySizeConfig,
};
