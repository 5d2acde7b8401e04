//! # Toolhub Core - Tool Registry and Dispatch Engine
//!
//! Exposes a catalogue of schema-described tools, read-only resources and
//! prompt templates to a single trusted agent:
//! - Schema validation of loosely typed call arguments
//! - Filesystem path containment for file-touching tools
//! - Fixed-window rate limiting for network tools
//! - Per-call timeouts and panic capture with normalized results
//! - TCP+msgpack transport
//!
//! ## Architecture
//!
//! ```text
//!                    ┌─────────────────────────────────┐
//!   IPC requests  →  │         Dispatch Engine         │
//!                    │  ┌─────────┐ ┌─────────┐        │
//!                    │  │ Schema  │ │  Tool   │        │
//!                    │  │Validator│ │Registry │        │
//!                    │  └─────────┘ └─────────┘        │
//!                    │  ┌─────────┐ ┌─────────┐        │
//!                    │  │  Path   │ │RateLimit│        │
//!                    │  │  Guard  │ │   er    │        │
//!                    │  └─────────┘ └─────────┘        │
//!                    └─────────────────────────────────┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod builtin;
pub mod catalog;
pub mod dispatch;
pub mod guard;
pub mod ipc;
pub mod server;
pub mod tools;
pub mod types;

// Internal utilities
pub mod observability;

pub use dispatch::{CallRequest, CallResult, DispatchEngine};
pub use server::ToolServer;
pub use types::{Config, Error, IpcConfig, Result};
