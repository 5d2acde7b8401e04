//! Tool server facade: the six protocol operations over one dispatch engine
//! and the resource/prompt catalogues.

use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;

use crate::builtin;
use crate::catalog::{PromptCatalog, RenderedPrompt, ResourceCatalog, ResourceSource};
use crate::dispatch::{CallRequest, CallResult, DispatchEngine};
use crate::guard::{AccessMode, PathGuard, PathKind};
use crate::tools::ToolRegistry;
use crate::types::{Config, Error, Result};

#[derive(Debug)]
pub struct ToolServer {
    engine: DispatchEngine,
    resources: ResourceCatalog,
    prompts: PromptCatalog,
    started: Instant,
}

impl ToolServer {
    pub fn new(engine: DispatchEngine, resources: ResourceCatalog, prompts: PromptCatalog) -> Self {
        Self {
            engine,
            resources,
            prompts,
            started: Instant::now(),
        }
    }

    /// Server with every built-in tool, the discovered resources and the
    /// built-in prompts.
    pub fn from_config(config: &Config) -> Result<Self> {
        let guard = Arc::new(PathGuard::from_config(&config.sandbox)?);

        let mut registry = ToolRegistry::new();
        builtin::register_all(&mut registry, config)?;
        tracing::info!(tools = registry.len(), "Tool registry ready");

        let resources = ResourceCatalog::discover(&guard);
        let engine = DispatchEngine::from_config(Arc::new(registry), guard, config);
        Ok(Self::new(engine, resources, PromptCatalog::with_builtin()))
    }

    pub fn engine(&self) -> &DispatchEngine {
        &self.engine
    }

    pub fn list_tools(&self) -> Value {
        let tools: Vec<Value> = self.engine.registry().list().map(|d| d.to_listing()).collect();
        json!({ "tools": tools })
    }

    pub async fn call_tool(&self, request: CallRequest) -> CallResult {
        self.engine.dispatch(request).await
    }

    pub fn list_resources(&self) -> Value {
        let resources: Vec<Value> = self.resources.list().map(|r| r.to_listing()).collect();
        json!({ "resources": resources })
    }

    /// Read a resource. File resources are re-checked against the guard
    /// because the file may have been swapped since discovery.
    pub async fn read_resource(&self, uri: &str) -> Result<Value> {
        let resource = self.resources.lookup(uri)?;
        let text = match &resource.source {
            ResourceSource::File(path) => {
                let guarded = self.engine.guard().resolve(
                    &path.to_string_lossy(),
                    AccessMode::Read,
                    PathKind::File,
                )?;
                tokio::fs::read_to_string(guarded.as_path())
                    .await
                    .map_err(|e| Error::internal(format!("cannot read resource {uri}: {}", e.kind())))?
            }
            ResourceSource::Status => serde_json::to_string_pretty(&self.status())?,
        };
        Ok(json!({
            "uri": resource.uri,
            "mimeType": resource.mime_type,
            "text": text,
        }))
    }

    pub fn list_prompts(&self) -> Value {
        let prompts: Vec<Value> = self.prompts.list().map(|p| p.to_listing()).collect();
        json!({ "prompts": prompts })
    }

    pub fn get_prompt(&self, name: &str, arguments: &Map<String, Value>) -> Result<RenderedPrompt> {
        Ok(self.prompts.render(name, arguments)?)
    }

    fn status(&self) -> Value {
        json!({
            "status": "running",
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_seconds": self.started.elapsed().as_secs(),
            "tools": self.engine.registry().len(),
            "resources": self.resources.len(),
            "prompts": self.prompts.len(),
            "sandbox_roots": self.engine.guard().roots().len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn server(root: &std::path::Path) -> ToolServer {
        let mut config = Config::default();
        config.sandbox.allowed_roots = vec![root.to_path_buf()];
        ToolServer::from_config(&config).unwrap()
    }

    #[test]
    fn test_listings_in_registration_order() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        let tools = server.list_tools();
        assert_eq!(tools["tools"][0]["name"], "add");
        assert_eq!(tools["tools"][0]["sideEffect"], "pure");

        let prompts = server.list_prompts();
        assert_eq!(prompts["prompts"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_read_file_and_status_resources() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.csv"), "x\n1\n").unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let server = server(dir.path());

        let listing = server.list_resources();
        let uris: Vec<&str> = listing["resources"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["uri"].as_str().unwrap())
            .collect();
        assert_eq!(uris.len(), 3);
        assert!(uris[0].ends_with("a.txt"));
        assert!(uris[1].ends_with("b.csv"));
        assert_eq!(uris[2], "system://status");

        let text = server.read_resource(uris[0]).await.unwrap();
        assert_eq!(text["text"], "hello");
        assert_eq!(text["mimeType"], "text/plain");

        let status = server.read_resource("system://status").await.unwrap();
        let status: Value = serde_json::from_str(status["text"].as_str().unwrap()).unwrap();
        assert_eq!(status["resources"], 3);
        assert_eq!(status["prompts"], 5);

        let err = server.read_resource("file:///etc/passwd").await.unwrap_err();
        assert_eq!(err.to_ipc_error_code(), "NOT_FOUND");
    }

    #[test]
    fn test_get_prompt_errors_map_to_codes() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());

        let missing = server.get_prompt("code_review", &Map::new()).unwrap_err();
        assert_eq!(missing.to_ipc_error_code(), "INVALID_ARGUMENT");
        let unknown = server.get_prompt("nope", &Map::new()).unwrap_err();
        assert_eq!(unknown.to_ipc_error_code(), "NOT_FOUND");
    }
}
