use thiserror::Error;

/// Main error type for the Rebound supervisor
#[derive(Debug, Error)]
pub enum ReboundError {
    // Lifecycle errors
    #[error("Failed to spawn target: {0}")]
    SpawnError(String),

    #[error("Target failed to launch after {attempts} attempt(s): {reason}")]
    LaunchFailed { attempts: u32, reason: String },

    #[error("Failed to stop process {0}: {1}")]
    StopError(u32, String),

    #[error("Signal error: {0}")]
    SignalError(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Missing required configuration field: {0}")]
    MissingConfigField(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // Probe setup errors
    #[error("HTTP client error: {0}")]
    HttpClientError(String),

    // State export errors
    #[error("Failed to save status snapshot: {0}")]
    StateSaveError(String),

    // Logging setup errors
    #[error("Log error: {0}")]
    LogError(String),

    // IO errors (automatically converted from std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Rebound operations
pub type Result<T> = std::result::Result<T, ReboundError>;
