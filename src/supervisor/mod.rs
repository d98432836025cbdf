//! Supervisor lifecycle: launch ordering, blocking wait, exit propagation
//!
//! The supervisor runs exactly one cycle:
//!
//! ```text
//! register signals → spawn keepalive (detached) → spawn worker (attached)
//!   → wait (races against SIGINT/SIGTERM) → release guard → mirror exit
//! ```
//!
//! The SIGINT/SIGTERM streams are installed before the first spawn, so a
//! termination signal arriving during the launch sequence is buffered until
//! the race below polls it instead of killing the supervisor with the
//! default disposition. The guard likewise owns the keepalive handle from
//! the moment the spawn resolves, so there is no window where a started
//! keepalive is unreachable by cleanup. The worker's exit status is
//! the supervisor's exit status; the keepalive's fate is never observable in
//! the exit code.

use crate::config::TandemConfig;
use crate::{Result, SupervisorError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub mod adapters;
pub mod guard;

pub use adapters::{
    ManagedProcess, MockAdapter, MockEvent, MockInstruction, ProcessAdapter,
};
#[cfg(unix)]
pub use adapters::UnixAdapter;
pub use guard::KeepaliveGuard;

/// Exit code used when the supervisor itself fails (e.g. a child could not be
/// spawned), distinct from anything mirrored from the worker
pub const SUPERVISOR_FAILURE_CODE: u8 = 125;

/// Exit status of a finished child process
///
/// On Unix exactly one of `code` and `signal` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Process ID of the exited child
    pub pid: u32,
    /// Exit code, when the process exited normally
    pub code: Option<i32>,
    /// Terminating signal, when the process was signal-killed
    pub signal: Option<i32>,
}

impl ProcessExit {
    /// Whether the process exited with code 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Numeric status for the supervisor to exit with: the code verbatim, or
    /// `128 + signal` for signal deaths (shell convention)
    pub fn status_code(&self) -> i32 {
        match (self.code, self.signal) {
            (Some(code), _) => code,
            (None, Some(signal)) => 128 + signal,
            (None, None) => 1,
        }
    }
}

/// How a run cycle was interrupted, if at all
enum Raced {
    /// The worker exited on its own
    Exited(ProcessExit),
    /// The supervisor received a termination signal while the worker ran
    Signalled(i32),
}

/// The supervisor: owns launch ordering and guaranteed cleanup
pub struct Supervisor {
    config: TandemConfig,
    adapter: Arc<dyn ProcessAdapter>,
}

impl Supervisor {
    /// Create a supervisor using the real Unix process adapter
    #[cfg(unix)]
    pub fn new(config: TandemConfig) -> Self {
        Self::with_adapter(config, Arc::new(UnixAdapter::new()))
    }

    /// Create a supervisor with a custom process adapter
    pub fn with_adapter(config: TandemConfig, adapter: Arc<dyn ProcessAdapter>) -> Self {
        Self { config, adapter }
    }

    /// Run one full supervision cycle and return the worker's exit status
    ///
    /// # Errors
    /// Returns [`SupervisorError::Launch`] if either child cannot be spawned;
    /// the keepalive, if already started, is still cleaned up. A worker exit
    /// with non-zero status is not an error.
    pub async fn run(&self) -> Result<ProcessExit> {
        let grace = Duration::from_secs(self.config.grace_period_secs);
        let mut keepalive_guard = KeepaliveGuard::new(grace);

        // Install the handlers before any child exists; a signal landing
        // mid-launch is buffered until the race below polls it
        let mut signals = TerminationSignals::register()?;

        let keepalive = self.adapter.spawn_detached(&self.config.background).await?;
        info!(
            pid = keepalive.pid(),
            command = %self.config.background.command,
            "Keepalive started"
        );
        keepalive_guard.arm(keepalive);

        let mut worker = match self.adapter.spawn_attached(&self.config.foreground).await {
            Ok(child) => child,
            Err(e) => {
                keepalive_guard.release().await;
                return Err(e);
            }
        };
        info!(
            pid = worker.pid(),
            command = %self.config.foreground.command,
            "Worker started, supervising until it exits"
        );

        let raced = tokio::select! {
            res = worker.wait() => match res {
                Ok(exit) => Raced::Exited(exit),
                Err(e) => {
                    keepalive_guard.release().await;
                    return Err(e);
                }
            },
            sig = signals.recv() => Raced::Signalled(sig),
        };

        let exit = match raced {
            Raced::Exited(exit) => exit,
            Raced::Signalled(signal) => {
                self.shutdown_worker(worker.as_mut(), signal, grace).await
            }
        };

        keepalive_guard.release().await;

        info!(
            pid = exit.pid,
            code = ?exit.code,
            signal = ?exit.signal,
            "Worker exited, mirroring its status"
        );
        Ok(exit)
    }

    /// Give the worker a graceful-shutdown window after the supervisor was
    /// told to terminate, then report how it went down
    async fn shutdown_worker(
        &self,
        worker: &mut dyn ManagedProcess,
        signal: i32,
        grace: Duration,
    ) -> ProcessExit {
        let pid = worker.pid();
        info!(pid, signal, "Termination signal received, stopping worker");

        if let Err(e) = worker.terminate() {
            warn!("Failed to forward SIGTERM to worker {pid}: {e}");
        }

        match tokio::time::timeout(grace, worker.wait()).await {
            Ok(Ok(exit)) => exit,
            Ok(Err(e)) => {
                warn!("Failed to reap worker {pid}: {e}");
                ProcessExit {
                    pid,
                    code: None,
                    signal: Some(signal),
                }
            }
            Err(_) => {
                warn!("Worker {pid} did not exit within {grace:?}, killing it");
                if let Err(e) = worker.kill() {
                    warn!("Failed to kill worker {pid}: {e}");
                }
                ProcessExit {
                    pid,
                    code: None,
                    signal: Some(signal),
                }
            }
        }
    }
}

/// SIGINT/SIGTERM streams for the supervisor process
///
/// Registration installs the OS handlers immediately, so signals delivered
/// between registration and the first `recv` poll are latched, not lost.
struct TerminationSignals {
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    #[cfg(unix)]
    fn register() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let sigint = signal(SignalKind::interrupt()).map_err(|e| {
            SupervisorError::Init(format!("failed to install SIGINT handler: {e}"))
        })?;
        let sigterm = signal(SignalKind::terminate()).map_err(|e| {
            SupervisorError::Init(format!("failed to install SIGTERM handler: {e}"))
        })?;
        Ok(Self { sigint, sigterm })
    }

    /// Resolves with the signal number when SIGINT or SIGTERM arrives
    #[cfg(unix)]
    async fn recv(&mut self) -> i32 {
        tokio::select! {
            _ = self.sigint.recv() => libc::SIGINT,
            _ = self.sigterm.recv() => libc::SIGTERM,
        }
    }

    #[cfg(not(unix))]
    fn register() -> Result<Self> {
        Ok(Self {})
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> i32 {
        let _ = tokio::signal::ctrl_c().await;
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChildSpec, TandemConfig};
    use std::time::Duration;

    fn test_config() -> TandemConfig {
        TandemConfig {
            background: ChildSpec::new("keepalive", &[]),
            foreground: ChildSpec::new("worker", &[]),
            grace_period_secs: 2,
        }
    }

    fn supervisor_with(adapter: &MockAdapter) -> Supervisor {
        Supervisor::with_adapter(test_config(), Arc::new(adapter.clone()))
    }

    #[test]
    fn test_status_code_mapping() {
        let normal = ProcessExit {
            pid: 1,
            code: Some(3),
            signal: None,
        };
        assert_eq!(normal.status_code(), 3);
        assert!(!normal.success());

        let clean = ProcessExit {
            pid: 1,
            code: Some(0),
            signal: None,
        };
        assert_eq!(clean.status_code(), 0);
        assert!(clean.success());

        let signalled = ProcessExit {
            pid: 1,
            code: None,
            signal: Some(9),
        };
        assert_eq!(signalled.status_code(), 137);
    }

    #[tokio::test]
    async fn test_exit_status_mirrored() {
        let adapter = MockAdapter::new();
        adapter.push_detached(MockInstruction::long_running());
        adapter.push_attached(MockInstruction::exits_with(3, Duration::from_millis(30)));

        let exit = supervisor_with(&adapter).run().await.unwrap();
        assert_eq!(exit.code, Some(3));
        assert_eq!(exit.status_code(), 3);
    }

    #[tokio::test]
    async fn test_clean_exit_mirrored() {
        let adapter = MockAdapter::new();
        adapter.push_detached(MockInstruction::long_running());
        adapter.push_attached(MockInstruction::exits_with(0, Duration::from_millis(30)));

        let exit = supervisor_with(&adapter).run().await.unwrap();
        assert!(exit.success());
    }

    #[tokio::test]
    async fn test_signal_death_mirrored() {
        let adapter = MockAdapter::new();
        adapter.push_detached(MockInstruction::long_running());
        adapter.push_attached(MockInstruction {
            exit_delay: Duration::from_millis(30),
            exit_code: None,
            signal: Some(9),
            ..Default::default()
        });

        let exit = supervisor_with(&adapter).run().await.unwrap();
        assert_eq!(exit.status_code(), 137);
    }

    #[tokio::test]
    async fn test_keepalive_terminated_after_worker_exit() {
        let adapter = MockAdapter::new();
        adapter.push_detached(MockInstruction::long_running());
        adapter.push_attached(MockInstruction::exits_with(0, Duration::from_millis(30)));

        supervisor_with(&adapter).run().await.unwrap();

        let events = adapter.events();
        let keepalive_pid = events
            .iter()
            .find_map(|e| match e {
                MockEvent::SpawnedDetached(pid) => Some(*pid),
                _ => None,
            })
            .expect("keepalive was spawned");
        assert!(events.contains(&MockEvent::Terminated(keepalive_pid)));
    }

    #[tokio::test]
    async fn test_launch_failure_aborts_before_worker() {
        let adapter = MockAdapter::new();
        adapter.push_detached(MockInstruction::spawn_failure("no such file"));

        let err = supervisor_with(&adapter).run().await.unwrap_err();
        assert_eq!(err.code(), "TDM001");
        assert_eq!(adapter.attached_spawns(), 0);
    }

    #[tokio::test]
    async fn test_worker_launch_failure_releases_keepalive() {
        let adapter = MockAdapter::new();
        adapter.push_detached(MockInstruction::long_running());
        adapter.push_attached(MockInstruction::spawn_failure("permission denied"));

        let err = supervisor_with(&adapter).run().await.unwrap_err();
        assert_eq!(err.code(), "TDM001");

        let events = adapter.events();
        let keepalive_pid = events
            .iter()
            .find_map(|e| match e {
                MockEvent::SpawnedDetached(pid) => Some(*pid),
                _ => None,
            })
            .expect("keepalive was spawned");
        assert!(events.contains(&MockEvent::Terminated(keepalive_pid)));
    }

    #[tokio::test]
    async fn test_worker_wait_failure_releases_keepalive_gracefully() {
        let adapter = MockAdapter::new();
        adapter.push_detached(MockInstruction::long_running());
        adapter.push_attached(MockInstruction {
            wait_error: Some("lost track of child".to_string()),
            ..Default::default()
        });

        let err = supervisor_with(&adapter).run().await.unwrap_err();
        assert_eq!(err.code(), "TDM002");

        let events = adapter.events();
        let keepalive_pid = events
            .iter()
            .find_map(|e| match e {
                MockEvent::SpawnedDetached(pid) => Some(*pid),
                _ => None,
            })
            .expect("keepalive was spawned");
        // Graceful release: SIGTERM delivered, no SIGKILL fallback
        assert!(events.contains(&MockEvent::Terminated(keepalive_pid)));
        assert!(!events.contains(&MockEvent::Killed(keepalive_pid)));
    }

    #[tokio::test]
    async fn test_launch_ordering_keepalive_first() {
        let adapter = MockAdapter::new();
        adapter.push_detached(MockInstruction::long_running());
        adapter.push_attached(MockInstruction::exits_with(0, Duration::from_millis(30)));

        supervisor_with(&adapter).run().await.unwrap();

        let events = adapter.events();
        let detached_idx = events
            .iter()
            .position(|e| matches!(e, MockEvent::SpawnedDetached(_)))
            .unwrap();
        let attached_idx = events
            .iter()
            .position(|e| matches!(e, MockEvent::SpawnedAttached(_)))
            .unwrap();
        assert!(detached_idx < attached_idx);
    }
}
