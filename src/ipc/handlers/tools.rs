//! Tools service handler: listing and dispatch.

use serde_json::Value;

use crate::dispatch::CallRequest;
use crate::server::ToolServer;
use crate::types::{Error, Result};

pub async fn handle(server: &ToolServer, method: &str, body: Value) -> Result<Value> {
    match method {
        "ListTools" => Ok(server.list_tools()),

        // Tool failures travel in-band as `{success: false, error}`; only a
        // malformed request body is a transport error.
        "CallTool" => {
            let request: CallRequest = serde_json::from_value(body)
                .map_err(|e| Error::validation(format!("Invalid call request: {}", e)))?;
            Ok(server.call_tool(request).await.to_json())
        }

        _ => Err(Error::not_found(format!("Unknown tools method: {}", method))),
    }
}
