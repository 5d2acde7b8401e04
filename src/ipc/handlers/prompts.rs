//! Prompts service handler.

use serde_json::Value;

use crate::ipc::router::{object_field, str_field};
use crate::server::ToolServer;
use crate::types::{Error, Result};

pub fn handle(server: &ToolServer, method: &str, body: Value) -> Result<Value> {
    match method {
        "ListPrompts" => Ok(server.list_prompts()),

        "GetPrompt" => {
            let name = str_field(&body, "name")?;
            let arguments = object_field(&body, "arguments")?;
            let rendered = server.get_prompt(&name, &arguments)?;
            Ok(serde_json::to_value(rendered)?)
        }

        _ => Err(Error::not_found(format!("Unknown prompts method: {}", method))),
    }
}
