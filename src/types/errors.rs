//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context. Tool call failures are NOT errors at
//! this level: they travel in-band as [`crate::dispatch::CallResult`].

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the tool server.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed request or argument (IPC code INVALID_ARGUMENT).
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown tool, resource, prompt or service (IPC code NOT_FOUND).
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate registration (IPC code ALREADY_EXISTS).
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Sandbox policy refused the operation (IPC code PERMISSION_DENIED).
    #[error("security violation: {0}")]
    Security(String),

    /// Internal errors (IPC code INTERNAL).
    #[error("internal error: {0}")]
    Internal(String),

    /// Timeout (IPC code DEADLINE_EXCEEDED).
    #[error("timeout: {0}")]
    Timeout(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable error code for the IPC error envelope.
    pub fn to_ipc_error_code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "INVALID_ARGUMENT",
            Error::NotFound(_) => "NOT_FOUND",
            Error::AlreadyExists(_) => "ALREADY_EXISTS",
            Error::Security(_) => "PERMISSION_DENIED",
            Error::Timeout(_) => "DEADLINE_EXCEEDED",
            Error::Internal(_) | Error::Serialization(_) | Error::Io(_) => "INTERNAL",
        }
    }
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    pub fn security(msg: impl Into<String>) -> Self {
        Self::Security(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }
}
