//! Error Handling
//!
//! Unified error types for the application.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or invalid sync settings (local folder, connection, remote path)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote endpoint unreachable or remote path absent
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// A directory could not be registered with the file watcher
    #[error("Watch registration error: {0}")]
    WatchRegistration(String),

    /// The mirroring process failed or could not be started
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connectivity error
    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    /// Create a watch registration error
    pub fn watch_registration(msg: impl Into<String>) -> Self {
        Self::WatchRegistration(msg.into())
    }

    /// Create a transfer error
    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::Transfer(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<notify::Error> for AppError {
    fn from(err: notify::Error) -> Self {
        Self::WatchRegistration(err.to_string())
    }
}

/// Convert AppError to a string suitable for UI responses
impl From<AppError> for String {
    fn from(err: AppError) -> String {
        err.to_string()
    }
}
