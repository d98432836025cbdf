//! Unix process management for the supervised pair
//!
//! The background keepalive is spawned into its own session via `setsid()`,
//! which detaches it from the controlling terminal and makes it the leader of
//! a fresh process group. That lets the supervisor later signal the entire
//! keepalive tree through the negative process ID (`killpg`) without racing
//! against whatever children the keepalive itself forked.
//!
//! The foreground worker is spawned attached: it stays in the supervisor's
//! process group so terminal- or orchestrator-delivered signals reach it the
//! normal way, and its stdio is inherited so the container log stream shows
//! the worker's own output.
//!
//! "Process not found" (`ESRCH`) and "permission denied" (`EPERM`) on signal
//! delivery are treated as success: both mean the target is already gone or
//! beyond our reach, and cleanup is best-effort by contract.

// Process management requires libc::setsid() in pre_exec
#![allow(unsafe_code)]

use crate::config::ChildSpec;
use crate::{Result, SupervisorError};
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, error};

/// A spawned child process
///
/// For detached children the process is its own session/group leader, so
/// `pid` doubles as the process group ID.
#[derive(Debug)]
pub struct ChildProcess {
    /// The process ID of the spawned process
    pid: Pid,
    /// The underlying Child handle for waiting and status checking
    child: Child,
}

impl ChildProcess {
    /// Get the process ID
    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Wait for the process to exit and return its exit status (async)
    pub async fn wait(&mut self) -> Result<std::process::ExitStatus> {
        self.child.wait().await.map_err(|e| {
            SupervisorError::Wait(format!("failed to wait for process {}: {e}", self.pid))
        })
    }

    /// Try to wait for the process to exit without blocking
    pub fn try_wait(&mut self) -> Result<Option<std::process::ExitStatus>> {
        self.child.try_wait().map_err(|e| {
            SupervisorError::Wait(format!("failed to try_wait for process {}: {e}", self.pid))
        })
    }
}

fn build_command(spec: &ChildSpec) -> Command {
    let mut command = Command::new(&spec.command);
    command.args(&spec.args);
    command.envs(&spec.environment);
    if let Some(dir) = &spec.working_directory {
        command.current_dir(dir);
    }
    command
}

fn finish_spawn(command: &mut Command, spec: &ChildSpec) -> Result<ChildProcess> {
    let child = command.spawn().map_err(|e| {
        error!("Failed to spawn '{}': {}", spec.command, e);
        SupervisorError::Launch(format!("failed to spawn '{}': {e}", spec.command))
    })?;

    // tokio::process::Child::id() returns None once the child has been reaped
    let raw_pid = child
        .id()
        .ok_or_else(|| SupervisorError::Launch("spawned child did not have a PID".to_string()))?;
    let pid = Pid::from_raw(raw_pid as i32);

    Ok(ChildProcess { pid, child })
}

/// Spawn the detached keepalive in its own session and process group
///
/// The child calls `setsid()` before `exec()`, becoming session and group
/// leader with no controlling terminal. Its stdin is closed; stdout/stderr
/// stay on the container's log stream.
pub fn spawn_detached(spec: &ChildSpec) -> Result<ChildProcess> {
    debug!("Spawning detached process: {} {:?}", spec.command, spec.args);

    let mut command = build_command(spec);
    command.stdin(Stdio::null());

    // Safety: setsid() is async-signal-safe and appropriate for use in pre_exec
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = finish_spawn(&mut command, spec)?;
    debug!(
        "Spawned detached process {} in new process group",
        child.pid
    );
    Ok(child)
}

/// Spawn the foreground worker attached to the supervisor
///
/// The child inherits the supervisor's stdio and process group, so signals
/// sent to the group (Ctrl+C, an orchestrator's SIGTERM to the container)
/// reach it directly.
pub fn spawn_attached(spec: &ChildSpec) -> Result<ChildProcess> {
    debug!("Spawning attached process: {} {:?}", spec.command, spec.args);

    let mut command = build_command(spec);
    let child = finish_spawn(&mut command, spec)?;
    debug!("Spawned attached process {}", child.pid);
    Ok(child)
}

fn map_signal_result(
    target: &str,
    pid: Pid,
    sig: Signal,
    result: nix::Result<()>,
) -> Result<()> {
    match result {
        Ok(()) => {
            debug!("Sent {} to {} {}", sig, target, pid);
            Ok(())
        }
        // Target doesn't exist, which means it already exited
        Err(nix::errno::Errno::ESRCH) => {
            debug!("{} {} already exited", target, pid);
            Ok(())
        }
        // Permission denied, likely already exited or reparented
        Err(nix::errno::Errno::EPERM) => {
            debug!("Permission denied signaling {} {}", target, pid);
            Ok(())
        }
        Err(e) => Err(SupervisorError::Signal(format!(
            "failed to send {sig} to {target} {pid}: {e}"
        ))),
    }
}

/// Send SIGTERM to the process group for graceful termination
pub fn signal_term_group(child: &ChildProcess) -> Result<()> {
    map_signal_result(
        "process group",
        child.pid,
        Signal::SIGTERM,
        killpg(child.pid, Signal::SIGTERM),
    )
}

/// Send SIGKILL to the process group for forceful termination
pub fn signal_kill_group(child: &ChildProcess) -> Result<()> {
    map_signal_result(
        "process group",
        child.pid,
        Signal::SIGKILL,
        killpg(child.pid, Signal::SIGKILL),
    )
}

/// Send SIGTERM to a single process (used for the attached foreground child)
pub fn signal_term(child: &ChildProcess) -> Result<()> {
    map_signal_result(
        "process",
        child.pid,
        Signal::SIGTERM,
        kill(child.pid, Signal::SIGTERM),
    )
}

/// Send SIGKILL to a single process
pub fn signal_kill(child: &ChildProcess) -> Result<()> {
    map_signal_result(
        "process",
        child.pid,
        Signal::SIGKILL,
        kill(child.pid, Signal::SIGKILL),
    )
}
