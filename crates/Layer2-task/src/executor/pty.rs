//! PTY executor - runs a program attached to a pseudo-terminal
//!
//! Uses portable-pty so the child sees an interactive terminal rather than a
//! pipe. Tools that switch buffering or progress output on `isatty` behave as
//! they would for a human user.
//!
//! A spawned [`PtyProcess`] splits into:
//! - the master handle (resize, input writer); dropping it releases the PTY
//! - a blocking reader yielding the child's combined stdout/stderr
//! - a [`ChildWaiter`] that blocks until exit
//! - a [`ProcessKiller`] usable while another thread is blocked in `wait`

use crate::command::CommandLine;
use crate::error::{Result, TaskError};
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use relay_foundation::PtyConfig;
use std::io::{Read, Write};
use tracing::{debug, info, warn};

/// PTY size configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtySizeConfig {
    pub rows: u16,
    pub cols: u16,
}

impl Default for PtySizeConfig {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

impl From<&PtyConfig> for PtySizeConfig {
    fn from(config: &PtyConfig) -> Self {
        Self {
            rows: config.rows,
            cols: config.cols,
        }
    }
}

impl PtySizeConfig {
    fn to_pty_size(self) -> PtySize {
        PtySize {
            rows: self.rows,
            cols: self.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when the exit status could not be collected
    pub code: Option<u32>,
    pub success: bool,
}

impl ProcessExit {
    pub fn unknown() -> Self {
        Self {
            code: None,
            success: false,
        }
    }
}

/// Spawns commands under a fresh PTY
#[derive(Debug, Clone, Copy, Default)]
pub struct PtyExecutor;

impl PtyExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Start `command` attached to a new PTY of `size`.
    ///
    /// The child inherits this process's environment and working directory,
    /// with `command.env` applied on top.
    pub fn spawn(&self, command: &CommandLine, size: PtySizeConfig) -> Result<PtyProcess> {
        let pair = native_pty_system()
            .openpty(size.to_pty_size())
            .map_err(|e| TaskError::spawn_failed(&command.program, format!("failed to open PTY: {}", e)))?;

        let mut cmd = CommandBuilder::new(&command.program);
        for arg in &command.args {
            cmd.arg(arg);
        }
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        // portable-pty defaults to $HOME otherwise
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| TaskError::spawn_failed(&command.program, e))?;

        // The master only sees end-of-stream once every slave fd is closed
        drop(pair.slave);

        let reader = match pair.master.try_clone_reader() {
            Ok(reader) => reader,
            Err(e) => {
                terminate_child(child);
                return Err(TaskError::spawn_failed(
                    &command.program,
                    format!("failed to clone PTY reader: {}", e),
                ));
            }
        };

        info!(
            pid = ?child.process_id(),
            rows = size.rows,
            cols = size.cols,
            "Started PTY process: {}",
            command.display()
        );

        Ok(PtyProcess {
            master: PtyMaster {
                inner: pair.master,
            },
            reader,
            child,
        })
    }
}

/// A running child attached to a PTY
pub struct PtyProcess {
    master: PtyMaster,
    reader: Box<dyn Read + Send>,
    child: Box<dyn Child + Send + Sync>,
}

impl std::fmt::Debug for PtyProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyProcess")
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}

impl PtyProcess {
    pub fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }

    pub fn resize(&self, size: PtySizeConfig) -> bool {
        self.master.resize(size)
    }

    pub fn killer(&self) -> ProcessKiller {
        ProcessKiller {
            inner: self.child.clone_killer(),
            pid: self.pid(),
        }
    }

    pub fn into_parts(self) -> PtyParts {
        let killer = self.killer();
        PtyParts {
            master: self.master,
            reader: self.reader,
            waiter: ChildWaiter { child: self.child },
            killer,
        }
    }
}

/// Independently owned pieces of a [`PtyProcess`]
pub struct PtyParts {
    pub master: PtyMaster,
    pub reader: Box<dyn Read + Send>,
    pub waiter: ChildWaiter,
    pub killer: ProcessKiller,
}

/// Master side of the PTY
pub struct PtyMaster {
    inner: Box<dyn MasterPty + Send>,
}

impl std::fmt::Debug for PtyMaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyMaster").finish_non_exhaustive()
    }
}

impl PtyMaster {
    /// Change the terminal geometry. Failures are logged, not fatal.
    pub fn resize(&self, size: PtySizeConfig) -> bool {
        match self.inner.resize(size.to_pty_size()) {
            Ok(()) => {
                debug!(rows = size.rows, cols = size.cols, "Set PTY size");
                true
            }
            Err(e) => {
                warn!("Failed to set PTY size to {}x{}: {}", size.cols, size.rows, e);
                false
            }
        }
    }

    /// Input side of the terminal; can be taken once
    pub fn take_writer(&self) -> Result<Box<dyn Write + Send>> {
        self.inner.take_writer().map_err(|e| {
            TaskError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("failed to take PTY writer: {}", e),
            ))
        })
    }
}

/// Blocks until the child exits
pub struct ChildWaiter {
    child: Box<dyn Child + Send + Sync>,
}

impl ChildWaiter {
    /// Blocking; run on the blocking pool
    pub fn wait(mut self) -> ProcessExit {
        match self.child.wait() {
            Ok(status) => ProcessExit {
                code: Some(status.exit_code()),
                success: status.success(),
            },
            Err(e) => {
                warn!("Failed to collect PTY child exit status: {}", e);
                ProcessExit::unknown()
            }
        }
    }
}

/// Detached kill handle for a PTY child
pub struct ProcessKiller {
    inner: Box<dyn ChildKiller + Send + Sync>,
    pid: Option<u32>,
}

impl std::fmt::Debug for ProcessKiller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessKiller").field("pid", &self.pid).finish()
    }
}

impl ProcessKiller {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Hang up the terminal, then SIGKILL the child on unix.
    ///
    /// A child that has already exited is not an error.
    pub fn kill(&mut self) -> std::io::Result<()> {
        let hangup = self.inner.kill();
        if let Err(e) = &hangup {
            debug!(pid = ?self.pid, "SIGHUP not delivered: {}", e);
        }

        #[cfg(unix)]
        if let Some(pid) = self.pid {
            return force_kill(pid);
        }
        hangup
    }
}

#[cfg(unix)]
fn force_kill(pid: u32) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(pid).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("pid {} out of range", pid))
    })?;

    // SAFETY: kill(2) takes plain integers and touches no memory we own
    if unsafe { libc::kill(pid, libc::SIGKILL) } == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ESRCH) => Ok(()),
        _ => Err(err),
    }
}

fn terminate_child(mut child: Box<dyn Child + Send + Sync>) {
    if let Err(e) = child.kill() {
        warn!(pid = ?child.process_id(), "Failed to kill PTY child: {}", e);
    }
    if let Err(e) = child.wait() {
        warn!(pid = ?child.process_id(), "Failed to reap PTY child: {}", e);
    }
}
