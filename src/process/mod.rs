//! Platform-specific process primitives

#[cfg(unix)]
pub mod unix;
