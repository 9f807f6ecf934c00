use thiserror::Error;

/// Main error type for the warden supervisor
#[derive(Debug, Error)]
pub enum WardenError {
    // Configuration errors
    #[error("Invalid configuration for app '{name}': {}", .violations.join("; "))]
    InvalidConfig {
        name: String,
        violations: Vec<String>,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Process-related errors
    #[error("Failed to spawn process: {0}")]
    SpawnError(String),

    #[error("Signal error: {0}")]
    SignalError(String),

    // Log-related errors
    #[error("Failed to open log file: {0}")]
    LogOpenError(String),

    #[error("Log error: {0}")]
    LogError(String),

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for warden operations
pub type Result<T> = std::result::Result<T, WardenError>;
