//! Error types for the multipurge crate

use thiserror::Error;

/// Result type alias for purge operations
pub type Result<T> = std::result::Result<T, PurgeError>;

/// Error types that can occur while orchestrating a purge
#[derive(Error, Debug, Clone)]
pub enum PurgeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Purge backend \"{0}\" not recognized")]
    UnknownBackend(String),

    #[error("Transport failure for {url}: {message}")]
    TransportFailure { url: String, message: String },

    #[error("Executor failure: {0}")]
    ExecutorFailure(String),

    #[error("Queue error: {0}")]
    QueueError(String),

    #[error("Invalid purge request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<std::io::Error> for PurgeError {
    fn from(err: std::io::Error) -> Self {
        PurgeError::IoError(err.to_string())
    }
}

impl PurgeError {
    /// Whether the job can degrade and continue after this error.
    ///
    /// Backend construction failures and individual request failures are
    /// absorbed into the aggregate result. Only a failure of the execution
    /// machinery itself ends the job.
    pub fn is_recoverable(&self) -> bool {
        match self {
            PurgeError::ConfigError(_) => true,
            PurgeError::UnknownBackend(_) => true,
            PurgeError::TransportFailure { .. } => true,

            PurgeError::ExecutorFailure(_) => false,
            PurgeError::QueueError(_) => false,
            PurgeError::InvalidRequest(_) => false,
            PurgeError::IoError(_) => false,
            PurgeError::ParseError(_) => false,
        }
    }

    /// Convert error to HTTP status code for the trigger endpoint
    pub fn to_http_status(&self) -> u16 {
        match self {
            PurgeError::InvalidRequest(_) => 400,
            PurgeError::ParseError(_) => 400,
            PurgeError::UnknownBackend(_) => 400,

            PurgeError::TransportFailure { .. } => 502,
            PurgeError::ExecutorFailure(_) => 500,
            PurgeError::QueueError(_) => 503,
            PurgeError::ConfigError(_) => 500,
            PurgeError::IoError(_) => 500,
        }
    }

    /// Create a TransportFailure for a request URL
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        PurgeError::TransportFailure {
            url: url.into(),
            message: message.into(),
        }
    }
}
