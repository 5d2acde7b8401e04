//! Per-service IPC handlers.

pub mod prompts;
pub mod resources;
pub mod tools;
