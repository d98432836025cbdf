//! Supervisor error types and utilities

use thiserror::Error;

/// Supervisor-specific error types
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Launch error: {0}")]
    Launch(String),

    #[error("Wait error: {0}")]
    Wait(String),

    #[error("Signal error: {0}")]
    Signal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Initialization error: {0}")]
    Init(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            SupervisorError::Launch(_) => "TDM001",
            SupervisorError::Wait(_) => "TDM002",
            SupervisorError::Signal(_) => "TDM003",
            SupervisorError::Config(_) => "TDM004",
            SupervisorError::Validation(_) => "TDM005",
            SupervisorError::Init(_) => "TDM006",
            SupervisorError::Io(_) => "TDM007",
        }
    }
}

/// Supervisor-specific result type
pub type Result<T> = std::result::Result<T, SupervisorError>;
