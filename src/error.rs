//! Error types for metric-rules

use std::io;
use thiserror::Error;

/// Result type alias for metric-rules operations
pub type Result<T> = std::result::Result<T, RulesError>;

#[derive(Error, Debug)]
pub enum RulesError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Rule rejected at registration time
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    /// Alert action reported a failure
    #[error("Action error: {0}")]
    Action(String),

    /// Unsupported platform
    #[error("Unsupported platform: {0}")]
    Unsupported(String),
}
