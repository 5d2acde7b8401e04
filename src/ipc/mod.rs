//! TCP+msgpack IPC transport layer.
//!
//! Length-prefixed msgpack frames carrying `{id, service, method, body}`
//! requests for the `tools`, `resources` and `prompts` services.

pub mod codec;
pub mod handlers;
pub mod router;
pub mod server;

pub use server::IpcServer;
