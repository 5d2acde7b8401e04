//! Core types for the tool server.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (CallId)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Static startup configuration (sandbox, rate limits, timeouts)

mod config;
mod errors;
mod ids;

pub use config::{
    Config, DispatchConfig, IpcConfig, ObservabilityConfig, RateLimitConfig, RateLimitKey,
    SandboxConfig, ServerConfig, WebConfig,
};
pub use errors::{Error, Result};
pub use ids::CallId;
