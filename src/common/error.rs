//! Error types for stepdeck
//!
//! Error messages are meant to be read by someone sitting in front of the
//! control UI or the terminal, with hints on how to fix common mistakes.
//! Reset/Exit are not errors and never appear here; see
//! [`crate::session::ControlSignal`].

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for stepdeck
#[derive(Error, Debug)]
pub enum Error {
    // === Extraction Errors ===
    #[error("Failed to parse test source at {line}:{column}: {message}")]
    Parse {
        line: u32,
        column: u32,
        message: String,
    },

    #[error("Test '{selector}' not found in {path}. Use 'stepdeck list <file>' to see test ids")]
    TestNotFound { selector: String, path: String },

    #[error("No steps found in test '{0}'. The test must call at least one page action")]
    NoSteps(String),

    #[error("{failed} of {total} test(s) did not pass")]
    TestsFailed { failed: usize, total: usize },

    // === Session Errors ===
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid command parameters: {0}")]
    InvalidParams(String),

    #[error("Session is shutting down")]
    SessionClosed,

    // === Page Driver Errors ===
    #[error("Page driver error: {0}")]
    Driver(String),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    // === Server Errors ===
    #[error("Failed to bind UI server on port {port}: {error}")]
    ServerBind { port: u16, error: String },

    #[error("UI server error: {0}")]
    Server(String),

    // === File Watch Errors ===
    #[error("Failed to watch test files: {0}")]
    Watch(#[from] notify::Error),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a parse error at a source position
    pub fn parse(line: u32, column: u32, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            column,
            message: message.into(),
        }
    }

    /// Create a test-not-found error
    pub fn test_not_found(selector: &str, path: &str) -> Self {
        Self::TestNotFound {
            selector: selector.to_string(),
            path: path.to_string(),
        }
    }

    /// Create a file read error
    pub fn file_read(path: &std::path::Path, error: &io::Error) -> Self {
        Self::FileRead {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }

    /// Whether this error came from the request rather than from the session
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownCommand(_) | Error::InvalidParams(_) | Error::Json(_)
        )
    }
}

/// Serializable error returned to HTTP clients of the UI server
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<&Error> for ErrorBody {
    fn from(e: &Error) -> Self {
        let code = match e {
            Error::UnknownCommand(_) => "UNKNOWN_COMMAND",
            Error::InvalidParams(_) => "INVALID_PARAMS",
            Error::Json(_) => "INVALID_REQUEST",
            Error::ProtocolViolation(_) => "PROTOCOL_VIOLATION",
            Error::SessionClosed => "SESSION_CLOSED",
            Error::Driver(_) => "DRIVER_ERROR",
            _ => "INTERNAL_ERROR",
        }
        .to_string();

        Self {
            code,
            message: e.to_string(),
        }
    }
}
