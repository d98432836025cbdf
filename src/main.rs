//! tandem binary
//!
//! Launches the keepalive sidecar and the foreground worker, and exits with
//! the worker's status. A failure of the supervisor itself (bad config, child
//! could not be spawned) exits with the reserved code 125.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tandem::{Supervisor, TandemConfig, SUPERVISOR_FAILURE_CODE};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "tandem")]
#[command(about = "Runs a keepalive sidecar and a foreground worker, tying their lifetimes together")]
#[command(version)]
struct Cli {
    /// Path to a TOML config describing the two children
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = tandem::utils::init_tracing(&cli.log_level) {
        eprintln!("tandem: failed to initialize logging: {e}");
        return ExitCode::from(SUPERVISOR_FAILURE_CODE);
    }

    let config = match &cli.config {
        Some(path) => match TandemConfig::load_from_path(path) {
            Ok(config) => config,
            Err(e) => {
                error!(code = e.code(), "Failed to load config: {e}");
                return ExitCode::from(SUPERVISOR_FAILURE_CODE);
            }
        },
        None => TandemConfig::default(),
    };

    if let Err(e) = config.validate() {
        error!(code = e.code(), "Invalid config: {e}");
        return ExitCode::from(SUPERVISOR_FAILURE_CODE);
    }

    info!(
        background = %config.background.command,
        foreground = %config.foreground.command,
        "Starting tandem supervisor"
    );

    match Supervisor::new(config).run().await {
        Ok(exit) => ExitCode::from((exit.status_code() & 0xff) as u8),
        Err(e) => {
            error!(code = e.code(), "Supervisor failed: {e}");
            ExitCode::from(SUPERVISOR_FAILURE_CODE)
        }
    }
}
