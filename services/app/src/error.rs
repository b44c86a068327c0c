//! services/app/src/error.rs
//!
//! Defines the primary error type for the app service and binaries.

use crate::config::ConfigError;
use daily_quiz_core::error::ClientError;
use daily_quiz_core::ports::PortError;

/// The primary error type for the `app` service.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the client logic.
    #[error("Client Error: {0}")]
    Client(#[from] ClientError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
