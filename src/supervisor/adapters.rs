//! Process adapters for abstracting process management
//!
//! The supervisor only needs two launch shapes (detached keepalive, attached
//! worker) and termination by handle. Abstracting those behind a trait lets
//! the lifecycle logic run against scripted mock processes in unit tests.

use crate::config::ChildSpec;
use crate::supervisor::ProcessExit;
use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Trait for launching the two supervised children
#[async_trait]
pub trait ProcessAdapter: Send + Sync {
    /// Spawn a child detached into its own session/process group
    async fn spawn_detached(&self, spec: &ChildSpec) -> Result<Box<dyn ManagedProcess>>;

    /// Spawn a child attached to the supervisor's process group and stdio
    async fn spawn_attached(&self, spec: &ChildSpec) -> Result<Box<dyn ManagedProcess>>;
}

/// Trait representing a launched process that can be awaited and terminated
#[async_trait]
pub trait ManagedProcess: Send + Sync + std::fmt::Debug {
    /// Get the process ID
    fn pid(&self) -> u32;

    /// Wait for the process to exit
    ///
    /// Cancel safe: dropping the future does not lose the exit status, and
    /// `wait` may be called again afterwards.
    async fn wait(&mut self) -> Result<ProcessExit>;

    /// Check for exit without blocking
    fn try_wait(&mut self) -> Result<Option<ProcessExit>>;

    /// Request graceful termination (SIGTERM)
    ///
    /// Best-effort: an already-exited target is success.
    fn terminate(&mut self) -> Result<()>;

    /// Terminate forcefully (SIGKILL)
    fn kill(&mut self) -> Result<()>;
}

/// Unix adapter backed by the process-group primitives
#[cfg(unix)]
#[derive(Copy, Clone, Debug, Default)]
pub struct UnixAdapter;

#[cfg(unix)]
impl UnixAdapter {
    /// Create a new Unix adapter
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
#[async_trait]
impl ProcessAdapter for UnixAdapter {
    async fn spawn_detached(&self, spec: &ChildSpec) -> Result<Box<dyn ManagedProcess>> {
        let child = crate::process::unix::spawn_detached(spec)?;
        Ok(Box::new(UnixManagedProcess {
            child,
            grouped: true,
        }))
    }

    async fn spawn_attached(&self, spec: &ChildSpec) -> Result<Box<dyn ManagedProcess>> {
        let child = crate::process::unix::spawn_attached(spec)?;
        Ok(Box::new(UnixManagedProcess {
            child,
            grouped: false,
        }))
    }
}

/// Unix managed process implementation
#[cfg(unix)]
#[derive(Debug)]
struct UnixManagedProcess {
    child: crate::process::unix::ChildProcess,
    /// Whether the child leads its own process group (detached spawn)
    grouped: bool,
}

#[cfg(unix)]
impl UnixManagedProcess {
    fn convert_status(&self, status: std::process::ExitStatus) -> ProcessExit {
        use std::os::unix::process::ExitStatusExt;
        ProcessExit {
            pid: self.child.pid(),
            code: status.code(),
            signal: status.signal(),
        }
    }
}

#[cfg(unix)]
#[async_trait]
impl ManagedProcess for UnixManagedProcess {
    fn pid(&self) -> u32 {
        self.child.pid()
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        let status = self.child.wait().await?;
        Ok(self.convert_status(status))
    }

    fn try_wait(&mut self) -> Result<Option<ProcessExit>> {
        let status = self.child.try_wait()?;
        Ok(status.map(|s| self.convert_status(s)))
    }

    fn terminate(&mut self) -> Result<()> {
        use crate::process::unix;
        if self.grouped {
            unix::signal_term_group(&self.child)
        } else {
            unix::signal_term(&self.child)
        }
    }

    fn kill(&mut self) -> Result<()> {
        use crate::process::unix;
        if self.grouped {
            unix::signal_kill_group(&self.child)
        } else {
            unix::signal_kill(&self.child)
        }
    }
}

/// What a mock process should do after it is spawned
#[derive(Debug, Clone)]
pub struct MockInstruction {
    /// How long to wait before the process "exits" on its own
    pub exit_delay: Duration,
    /// Exit code to return (None means killed by signal)
    pub exit_code: Option<i32>,
    /// Signal that killed the process
    pub signal: Option<i32>,
    /// Whether terminate/kill take effect immediately
    pub responds_to_signals: bool,
    /// If set, the spawn itself fails with this launch error
    pub spawn_error: Option<String>,
    /// If set, `wait` fails with this error instead of returning an exit
    pub wait_error: Option<String>,
}

impl Default for MockInstruction {
    fn default() -> Self {
        Self {
            exit_delay: Duration::from_millis(50),
            exit_code: Some(0),
            signal: None,
            responds_to_signals: true,
            spawn_error: None,
            wait_error: None,
        }
    }
}

impl MockInstruction {
    /// Instruction for a child that exits with the given code after a delay
    pub fn exits_with(code: i32, delay: Duration) -> Self {
        Self {
            exit_delay: delay,
            exit_code: Some(code),
            ..Default::default()
        }
    }

    /// Instruction for a long-running child only a signal will stop
    pub fn long_running() -> Self {
        Self {
            exit_delay: Duration::from_secs(3600),
            ..Default::default()
        }
    }

    /// Instruction whose spawn fails with a launch error
    pub fn spawn_failure(message: impl Into<String>) -> Self {
        Self {
            spawn_error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Observable lifecycle events recorded by mock processes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    SpawnedDetached(u32),
    SpawnedAttached(u32),
    Terminated(u32),
    Killed(u32),
}

/// Mock process adapter for testing the supervisor lifecycle
#[derive(Debug, Clone, Default)]
pub struct MockAdapter {
    detached: Arc<Mutex<Vec<MockInstruction>>>,
    attached: Arc<Mutex<Vec<MockInstruction>>>,
    events: Arc<Mutex<Vec<MockEvent>>>,
}

static NEXT_MOCK_PID: AtomicU32 = AtomicU32::new(10_000);

impl MockAdapter {
    /// Create a new mock adapter with no scripted instructions
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next detached (background) spawn
    pub fn push_detached(&self, instruction: MockInstruction) {
        self.detached.lock().unwrap().push(instruction);
    }

    /// Script the next attached (foreground) spawn
    pub fn push_attached(&self, instruction: MockInstruction) {
        self.attached.lock().unwrap().push(instruction);
    }

    /// Snapshot of the recorded lifecycle events
    pub fn events(&self) -> Vec<MockEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Number of attached spawns performed
    pub fn attached_spawns(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, MockEvent::SpawnedAttached(_)))
            .count()
    }

    fn take_instruction(queue: &Mutex<Vec<MockInstruction>>) -> MockInstruction {
        let mut queue = queue.lock().unwrap();
        if queue.is_empty() {
            MockInstruction::default()
        } else {
            queue.remove(0)
        }
    }

    fn spawn_from(
        &self,
        instruction: MockInstruction,
        record: fn(u32) -> MockEvent,
    ) -> Result<Box<dyn ManagedProcess>> {
        if let Some(message) = instruction.spawn_error {
            return Err(crate::SupervisorError::Launch(message));
        }
        let pid = NEXT_MOCK_PID.fetch_add(1, Ordering::Relaxed);
        self.events.lock().unwrap().push(record(pid));
        Ok(Box::new(MockManagedProcess::new(
            pid,
            instruction,
            self.events.clone(),
        )))
    }
}

#[async_trait]
impl ProcessAdapter for MockAdapter {
    async fn spawn_detached(&self, spec: &ChildSpec) -> Result<Box<dyn ManagedProcess>> {
        debug!("Spawning mock detached process for: {}", spec.command);
        let instruction = Self::take_instruction(&self.detached);
        self.spawn_from(instruction, MockEvent::SpawnedDetached)
    }

    async fn spawn_attached(&self, spec: &ChildSpec) -> Result<Box<dyn ManagedProcess>> {
        debug!("Spawning mock attached process for: {}", spec.command);
        let instruction = Self::take_instruction(&self.attached);
        self.spawn_from(instruction, MockEvent::SpawnedAttached)
    }
}

/// Mock managed process for testing
#[derive(Debug)]
struct MockManagedProcess {
    pid: u32,
    instruction: MockInstruction,
    started_at: Instant,
    terminated: bool,
    killed: bool,
    events: Arc<Mutex<Vec<MockEvent>>>,
}

impl MockManagedProcess {
    fn new(pid: u32, instruction: MockInstruction, events: Arc<Mutex<Vec<MockEvent>>>) -> Self {
        Self {
            pid,
            instruction,
            started_at: Instant::now(),
            terminated: false,
            killed: false,
            events,
        }
    }

    fn should_exit(&self) -> bool {
        if (self.killed || self.terminated) && self.instruction.responds_to_signals {
            return true;
        }
        self.started_at.elapsed() >= self.instruction.exit_delay
    }

    fn create_exit(&self) -> ProcessExit {
        let (code, signal) = if self.killed && self.instruction.responds_to_signals {
            (None, Some(libc_sigkill()))
        } else if self.terminated && self.instruction.responds_to_signals {
            (None, Some(libc_sigterm()))
        } else {
            (self.instruction.exit_code, self.instruction.signal)
        };
        ProcessExit {
            pid: self.pid,
            code,
            signal,
        }
    }
}

// Signal numbers without pulling libc into non-unix builds
fn libc_sigterm() -> i32 {
    15
}

fn libc_sigkill() -> i32 {
    9
}

#[async_trait]
impl ManagedProcess for MockManagedProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        if let Some(message) = &self.instruction.wait_error {
            return Err(crate::SupervisorError::Wait(message.clone()));
        }
        while !self.should_exit() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(self.create_exit())
    }

    fn try_wait(&mut self) -> Result<Option<ProcessExit>> {
        if self.should_exit() {
            Ok(Some(self.create_exit()))
        } else {
            Ok(None)
        }
    }

    fn terminate(&mut self) -> Result<()> {
        debug!("Terminating mock process {}", self.pid);
        self.terminated = true;
        self.events
            .lock()
            .unwrap()
            .push(MockEvent::Terminated(self.pid));
        Ok(())
    }

    fn kill(&mut self) -> Result<()> {
        debug!("Killing mock process {}", self.pid);
        self.killed = true;
        self.events.lock().unwrap().push(MockEvent::Killed(self.pid));
        Ok(())
    }
}
