//! Top-level IPC router: routes by service, delegates to handlers.

use serde_json::{Map, Value};

use crate::ipc::handlers;
use crate::server::ToolServer;
use crate::types::{Error, Result};

/// Route an IPC request to the appropriate service handler.
pub async fn route_request(server: &ToolServer, service: &str, method: &str, body: Value) -> Result<Value> {
    match service {
        "tools" => handlers::tools::handle(server, method, body).await,
        "resources" => handlers::resources::handle(server, method, body).await,
        "prompts" => handlers::prompts::handle(server, method, body),
        _ => Err(Error::not_found(format!("Unknown service: {}", service))),
    }
}

// =============================================================================
// Shared helpers: used by all handler modules
// =============================================================================

pub fn str_field(body: &Value, key: &str) -> Result<String> {
    body.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| Error::validation(format!("Missing required field: {}", key)))
}

/// Optional object field. Absent or null yields an empty map.
pub fn object_field(body: &Value, key: &str) -> Result<Map<String, Value>> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(Error::validation(format!("Field {} must be an object", key))),
    }
}
