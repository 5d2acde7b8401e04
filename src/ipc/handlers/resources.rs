//! Resources service handler.

use serde_json::Value;

use crate::ipc::router::str_field;
use crate::server::ToolServer;
use crate::types::{Error, Result};

pub async fn handle(server: &ToolServer, method: &str, body: Value) -> Result<Value> {
    match method {
        "ListResources" => Ok(server.list_resources()),

        "ReadResource" => {
            let uri = str_field(&body, "uri")?;
            server.read_resource(&uri).await
        }

        _ => Err(Error::not_found(format!("Unknown resources method: {}", method))),
    }
}
