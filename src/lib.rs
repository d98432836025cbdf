//! tandem — a two-process container supervisor
//!
//! Starts a detached keepalive sidecar and a foreground worker, then ties
//! their lifetimes together: when the worker exits (normally, with an error,
//! or because the container was told to stop) the keepalive is terminated
//! too, and the supervisor exits with the worker's own status.

pub mod config;
pub mod error;
#[cfg(unix)]
pub mod process;
pub mod supervisor;

pub use config::{ChildSpec, TandemConfig};
pub use error::{Result, SupervisorError};
pub use supervisor::{ProcessExit, Supervisor, SUPERVISOR_FAILURE_CODE};

/// Shared helpers for binaries
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| crate::SupervisorError::Init(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
