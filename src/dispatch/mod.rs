//! Call dispatch: request/outcome types and the engine that routes calls.

pub mod engine;
pub mod result;

pub use engine::{DispatchEngine, MAX_ERROR_MESSAGE_CHARS};
pub use result::{ArgumentError, CallRequest, CallResult, CallStage, Failure, FailureKind};
