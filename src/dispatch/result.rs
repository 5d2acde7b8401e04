//! Call request and outcome types, and their wire form.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::time::Duration;

use crate::guard::SecurityError;
use crate::tools::ValidationError;

/// One tool invocation as received from the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

impl CallRequest {
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
        }
    }
}

/// Lifecycle of a single dispatch. Logged at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStage {
    Received,
    Validated,
    Authorized,
    Executing,
    Completed,
    Rejected,
}

impl fmt::Display for CallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallStage::Received => "received",
            CallStage::Validated => "validated",
            CallStage::Authorized => "authorized",
            CallStage::Executing => "executing",
            CallStage::Completed => "completed",
            CallStage::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Top-level failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    UnknownTool,
    InvalidArguments,
    SecurityViolation,
    RateLimited,
    Timeout,
    HandlerError,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::UnknownTool => "UnknownTool",
            FailureKind::InvalidArguments => "InvalidArguments",
            FailureKind::SecurityViolation => "SecurityViolation",
            FailureKind::RateLimited => "RateLimited",
            FailureKind::Timeout => "Timeout",
            FailureKind::HandlerError => "HandlerError",
        }
    }

    /// Only throttling and timeouts are worth retrying; everything else is
    /// terminal for the call.
    pub fn retryable(self) -> bool {
        matches!(self, FailureKind::RateLimited | FailureKind::Timeout)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the arguments were refused: by the schema or by the handler itself.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentError {
    Schema(ValidationError),
    Handler(String),
}

/// Structured reason a call did not succeed.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    UnknownTool { name: String },
    InvalidArguments(ArgumentError),
    SecurityViolation { field: Option<String>, error: SecurityError },
    RateLimited { key: String, retry_after: Duration },
    Timeout { after: Duration },
    HandlerError { message: String },
}

impl Failure {
    pub fn kind(&self) -> FailureKind {
        match self {
            Failure::UnknownTool { .. } => FailureKind::UnknownTool,
            Failure::InvalidArguments(_) => FailureKind::InvalidArguments,
            Failure::SecurityViolation { .. } => FailureKind::SecurityViolation,
            Failure::RateLimited { .. } => FailureKind::RateLimited,
            Failure::Timeout { .. } => FailureKind::Timeout,
            Failure::HandlerError { .. } => FailureKind::HandlerError,
        }
    }

    /// Finer-grained subtype, where the kind has one.
    pub fn subtype(&self) -> Option<&'static str> {
        match self {
            Failure::InvalidArguments(ArgumentError::Schema(e)) => Some(e.kind()),
            Failure::InvalidArguments(ArgumentError::Handler(_)) => Some("InvalidInput"),
            Failure::SecurityViolation { error, .. } => Some(error.kind()),
            _ => None,
        }
    }

    /// Offending argument path, if known.
    pub fn field(&self) -> Option<&str> {
        match self {
            Failure::InvalidArguments(ArgumentError::Schema(e)) => Some(e.field()),
            Failure::SecurityViolation { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Failure::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Failure::UnknownTool { name } => format!("unknown tool: {name}"),
            Failure::InvalidArguments(ArgumentError::Schema(e)) => e.to_string(),
            Failure::InvalidArguments(ArgumentError::Handler(msg)) => msg.clone(),
            Failure::SecurityViolation { error, .. } => error.to_string(),
            Failure::RateLimited { key, retry_after } => format!(
                "rate limit exceeded for {key}; retry after {}ms",
                retry_after.as_millis()
            ),
            Failure::Timeout { after } => {
                format!("tool call timed out after {}ms", after.as_millis())
            }
            Failure::HandlerError { message } => message.clone(),
        }
    }

    pub fn to_json(&self) -> Value {
        let mut error = Map::new();
        error.insert("kind".into(), json!(self.kind().as_str()));
        if let Some(subtype) = self.subtype() {
            error.insert("subtype".into(), json!(subtype));
        }
        error.insert("message".into(), json!(self.message()));
        if let Some(field) = self.field() {
            error.insert("field".into(), json!(field));
        }
        if let Some(retry_after) = self.retry_after() {
            error.insert("retry_after_ms".into(), json!(retry_after.as_millis() as u64));
        }
        error.insert("retryable".into(), json!(self.kind().retryable()));
        Value::Object(error)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

/// Outcome of exactly one dispatch. Never partial.
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    Success(Value),
    Failure(Failure),
}

impl CallResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CallResult::Success(_))
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            CallResult::Success(payload) => Some(payload),
            CallResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            CallResult::Success(_) => None,
            CallResult::Failure(failure) => Some(failure),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            CallResult::Success(payload) => json!({ "success": true, "payload": payload }),
            CallResult::Failure(failure) => json!({ "success": false, "error": failure.to_json() }),
        }
    }
}

impl From<Failure> for CallResult {
    fn from(failure: Failure) -> Self {
        CallResult::Failure(failure)
    }
}
