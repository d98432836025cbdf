//! Scoped ownership of the keepalive process with guaranteed release
//!
//! [`KeepaliveGuard`] replaces exit-hook / trap-style cleanup with a resource
//! guard: the background child is handed to the guard the moment it is
//! spawned, and the guard releases it exactly once on whichever exit path the
//! supervisor takes. Release failures are logged, never escalated, so cleanup
//! can't mask the real exit reason.

use crate::supervisor::ManagedProcess;
use std::time::Duration;
use tracing::{debug, warn};

/// How often the guard polls for the child to disappear during release
const RELEASE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait after SIGKILL before giving up on reaping
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the background child from launch until release
pub struct KeepaliveGuard {
    child: Option<Box<dyn ManagedProcess>>,
    grace_period: Duration,
}

impl KeepaliveGuard {
    /// Create an unarmed guard
    pub fn new(grace_period: Duration) -> Self {
        Self {
            child: None,
            grace_period,
        }
    }

    /// Hand the background child to the guard
    pub fn arm(&mut self, child: Box<dyn ManagedProcess>) {
        debug!("Keepalive guard armed for pid {}", child.pid());
        self.child = Some(child);
    }

    /// Whether the guard currently holds a child
    pub fn is_armed(&self) -> bool {
        self.child.is_some()
    }

    /// Terminate the background child: SIGTERM, wait up to the grace period,
    /// escalate to SIGKILL
    ///
    /// Idempotent: the child handle is taken on first call, so repeated calls
    /// are no-ops. "Already exited" counts as success; any other signalling
    /// failure is logged as a warning and absorbed.
    pub async fn release(&mut self) {
        let Some(mut child) = self.child.take() else {
            debug!("Keepalive guard already released");
            return;
        };
        let pid = child.pid();

        if let Err(e) = child.terminate() {
            warn!("Cleanup warning: SIGTERM to keepalive {pid} failed: {e}");
        }

        if self.poll_until_exit(child.as_mut(), self.grace_period).await {
            debug!("Keepalive {pid} exited after SIGTERM");
            return;
        }

        warn!(
            "Keepalive {pid} did not exit within {:?}, sending SIGKILL",
            self.grace_period
        );
        if let Err(e) = child.kill() {
            warn!("Cleanup warning: SIGKILL to keepalive {pid} failed: {e}");
        }

        if self.poll_until_exit(child.as_mut(), KILL_REAP_TIMEOUT).await {
            debug!("Keepalive {pid} exited after SIGKILL");
        } else {
            warn!("Cleanup warning: keepalive {pid} still running after SIGKILL");
        }
    }

    async fn poll_until_exit(&self, child: &mut dyn ManagedProcess, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(exit)) => {
                    debug!(
                        "Keepalive {} reaped (code {:?}, signal {:?})",
                        exit.pid, exit.code, exit.signal
                    );
                    return true;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Cleanup warning: failed to poll keepalive: {e}");
                    return false;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(RELEASE_POLL_INTERVAL).await;
        }
    }
}

impl Drop for KeepaliveGuard {
    fn drop(&mut self) {
        // Panic-unwind and early-return fallback: no async context here, so
        // skip the graceful window and kill the group outright.
        if let Some(mut child) = self.child.take() {
            let pid = child.pid();
            warn!("Keepalive guard dropped while armed, killing {pid}");
            if let Err(e) = child.kill() {
                warn!("Cleanup warning: SIGKILL to keepalive {pid} failed: {e}");
            }
        }
    }
}
