use std::io;
use thiserror::Error;

/// Custom error type for the telemetry daemon
#[derive(Error, Debug)]
pub enum TelemdError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Instrument error: {0}")]
    Instrument(String),

    #[error("Not supported on this host: {0}")]
    Unsupported(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Daemon has already been run")]
    AlreadyRunning,

    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Result type alias for the telemetry daemon
pub type Result<T> = std::result::Result<T, TelemdError>;

impl TelemdError {
    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        TelemdError::Config(msg.into())
    }

    /// Create an instrument error
    pub fn instrument<S: Into<String>>(msg: S) -> Self {
        TelemdError::Instrument(msg.into())
    }

    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        TelemdError::Unsupported(msg.into())
    }

    pub fn parse<S: Into<String>>(msg: S) -> Self {
        TelemdError::Parse(msg.into())
    }

    pub fn runtime<S: Into<String>>(msg: S) -> Self {
        TelemdError::Runtime(msg.into())
    }
}
