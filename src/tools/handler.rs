//! Handler contract between the dispatch engine and tool implementations.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use crate::guard::{AccessMode, GuardedPath, PathGuard, PathKind, SecurityError};
use crate::tools::schema::ValidatedArguments;
use crate::types::CallId;

/// Error raised by a tool handler.
///
/// `InvalidInput` is the caller's fault and surfaces as invalid arguments;
/// everything else is a handler failure.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// I/O errors are reduced to their kind; the OS message may embed paths.
impl From<std::io::Error> for HandlerError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let msg = match err.kind() {
            ErrorKind::NotFound => "file not found".to_string(),
            ErrorKind::PermissionDenied => "permission denied".to_string(),
            ErrorKind::AlreadyExists => "file already exists".to_string(),
            ErrorKind::InvalidData => "file is not valid UTF-8 text".to_string(),
            kind => format!("i/o error ({kind})"),
        };
        Self::Failed(msg)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

/// Per-call context handed to handlers.
#[derive(Debug, Clone)]
pub struct CallContext {
    call_id: CallId,
    tool: Arc<str>,
    guard: Arc<PathGuard>,
}

impl CallContext {
    pub fn new(call_id: CallId, tool: impl Into<Arc<str>>, guard: Arc<PathGuard>) -> Self {
        Self {
            call_id,
            tool: tool.into(),
            guard,
        }
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Re-run the path guard immediately before I/O.
    pub fn resolve(
        &self,
        raw: &str,
        access: AccessMode,
        kind: PathKind,
    ) -> Result<GuardedPath, SecurityError> {
        self.guard.resolve(raw, access, kind)
    }

    pub fn read_file(&self, raw: &str) -> Result<GuardedPath, SecurityError> {
        self.resolve(raw, AccessMode::Read, PathKind::File)
    }

    pub fn write_file(&self, raw: &str) -> Result<GuardedPath, SecurityError> {
        self.resolve(raw, AccessMode::Write, PathKind::File)
    }

    pub fn read_dir(&self, raw: &str) -> Result<GuardedPath, SecurityError> {
        self.resolve(raw, AccessMode::Read, PathKind::Directory)
    }

    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }
}

/// Trait implemented by tool executors.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool with schema-validated arguments.
    async fn call(&self, args: ValidatedArguments, ctx: CallContext) -> Result<Value, HandlerError>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Send + Sync + Fn(ValidatedArguments, CallContext) -> Fut,
    Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
    async fn call(&self, args: ValidatedArguments, ctx: CallContext) -> Result<Value, HandlerError> {
        (self)(args, ctx).await
    }
}
