//! Error taxonomy

use thiserror::Error;

/// Failures that stop the engine from arming or finalizing
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Session not initialized. Please restart the test from the home page.")]
    SessionMissing,
    #[error("{0} permission denied")]
    PermissionDenied(&'static str),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Engine is no longer running")]
    Stopped,
}

/// Failures talking to an external capability
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Failed to decode response: {0}")]
    Decode(String),
    #[error("Rejected: {0}")]
    Rejected(String),
    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::Decode(err.to_string())
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

/// Failures loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
