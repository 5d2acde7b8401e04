//! Tool registry: descriptors and handlers keyed by tool name.
//!
//! Populated during startup through `&mut self`, then shared behind an `Arc`
//! and only read. Registration order is preserved for discovery listings.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::guard::{AccessMode, PathKind};
use crate::tools::handler::ToolHandler;
use crate::tools::schema::{Schema, SchemaType};
use crate::types::Error;

// =============================================================================
// Descriptor
// =============================================================================

/// What kind of external resource a tool touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffectClass {
    Pure,
    FilesystemRead,
    FilesystemWrite,
    Network,
}

impl SideEffectClass {
    pub fn is_filesystem(self) -> bool {
        matches!(
            self,
            SideEffectClass::FilesystemRead | SideEffectClass::FilesystemWrite
        )
    }
}

/// A path-bearing argument the engine must guard before the handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathField {
    pub name: String,
    pub access: AccessMode,
    pub kind: PathKind,
}

/// Immutable tool metadata.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Schema,
    pub side_effect: SideEffectClass,
    pub path_fields: Vec<PathField>,
    /// Argument carrying the remote URL; its host keys the rate limiter.
    pub url_field: Option<String>,
}

impl ToolDescriptor {
    /// New pure tool. Chain the builder methods for anything else.
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Schema) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            side_effect: SideEffectClass::Pure,
            path_fields: Vec::new(),
            url_field: None,
        }
    }

    pub fn side_effect(mut self, class: SideEffectClass) -> Self {
        self.side_effect = class;
        self
    }

    pub fn path_field(mut self, name: impl Into<String>, access: AccessMode, kind: PathKind) -> Self {
        self.path_fields.push(PathField {
            name: name.into(),
            access,
            kind,
        });
        self
    }

    pub fn url_field(mut self, name: impl Into<String>) -> Self {
        self.url_field = Some(name.into());
        self
    }

    /// Listing entry shown to the caller.
    pub fn to_listing(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema.to_json_schema(),
            "sideEffect": self.side_effect,
        })
    }

    fn check(&self) -> Result<(), RegistryError> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::InvalidName);
        }
        let invalid = |reason: String| RegistryError::InvalidDescriptor {
            name: self.name.clone(),
            reason,
        };

        if !self.input_schema.is_object() {
            return Err(invalid("input schema must be an object".into()));
        }
        if self.side_effect.is_filesystem() && self.path_fields.is_empty() {
            return Err(invalid("filesystem tools must declare their path fields".into()));
        }

        let is_string_field = |field: &str| {
            self.input_schema
                .properties()
                .iter()
                .any(|p| p.name == field && p.schema.kind == SchemaType::String)
        };
        for field in &self.path_fields {
            if !is_string_field(&field.name) {
                return Err(invalid(format!(
                    "path field '{}' is not a declared string property",
                    field.name
                )));
            }
        }
        if let Some(field) = &self.url_field {
            if !is_string_field(field) {
                return Err(invalid(format!(
                    "url field '{field}' is not a declared string property"
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool name cannot be empty")]
    InvalidName,

    #[error("tool '{name}' has an invalid descriptor: {reason}")]
    InvalidDescriptor { name: String, reason: String },
}

impl From<RegistryError> for Error {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DuplicateTool(_) => Error::already_exists(err.to_string()),
            RegistryError::UnknownTool(_) => Error::not_found(err.to_string()),
            _ => Error::validation(err.to_string()),
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// A descriptor paired with its handler.
#[derive(Clone)]
pub struct RegisteredTool {
    descriptor: ToolDescriptor,
    handler: Arc<dyn ToolHandler>,
}

impl RegisteredTool {
    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    pub fn handler(&self) -> &dyn ToolHandler {
        self.handler.as_ref()
    }
}

impl fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Tool name → (descriptor, handler), in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.tools.iter().map(|t| t.descriptor.name.as_str()).collect();
        f.debug_struct("ToolRegistry")
            .field("registered", &names)
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if the name is taken or the descriptor is
    /// inconsistent with its schema.
    pub fn register<H>(&mut self, descriptor: ToolDescriptor, handler: H) -> Result<(), RegistryError>
    where
        H: ToolHandler + 'static,
    {
        self.register_arc(descriptor, Arc::new(handler))
    }

    pub fn register_arc(
        &mut self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), RegistryError> {
        descriptor.check()?;
        if self.index.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateTool(descriptor.name));
        }

        tracing::debug!(tool = %descriptor.name, side_effect = ?descriptor.side_effect, "tool registered");
        self.index.insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool {
            descriptor,
            handler,
        });
        Ok(())
    }

    /// Get a tool by name.
    pub fn lookup(&self, name: &str) -> Result<&RegisteredTool, RegistryError> {
        self.index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Descriptors in registration order. The iterator is lazy and can be
    /// cloned to restart it.
    pub fn list(&self) -> impl Iterator<Item = &ToolDescriptor> + Clone + '_ {
        self.tools.iter().map(|t| &t.descriptor)
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::handler::{CallContext, HandlerError};
    use crate::tools::schema::ValidatedArguments;

    async fn noop(_args: ValidatedArguments, _ctx: CallContext) -> Result<Value, HandlerError> {
        Ok(Value::Null)
    }

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(
            name,
            "test tool",
            Schema::object().required("path", Schema::string()),
        )
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(descriptor("echo"), noop).unwrap();

        assert!(registry.contains("echo"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("echo").unwrap().descriptor().description, "test tool");
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(descriptor("echo"), noop).unwrap();

        let err = registry.register(descriptor("echo"), noop).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTool("echo".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_lookup() {
        let registry = ToolRegistry::new();
        assert_eq!(
            registry.lookup("ghost").unwrap_err(),
            RegistryError::UnknownTool("ghost".into())
        );
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut registry = ToolRegistry::new();
        assert_eq!(
            registry.register(descriptor("  "), noop).unwrap_err(),
            RegistryError::InvalidName
        );
    }

    #[test]
    fn test_list_preserves_registration_order_and_restarts() {
        let mut registry = ToolRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(descriptor(name), noop).unwrap();
        }

        let listing = registry.list();
        let first: Vec<&str> = listing.clone().map(|d| d.name.as_str()).collect();
        let second: Vec<&str> = listing.map(|d| d.name.as_str()).collect();
        assert_eq!(first, vec!["zeta", "alpha", "mid"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_filesystem_tool_requires_path_fields() {
        let mut registry = ToolRegistry::new();
        let err = registry
            .register(
                descriptor("reader").side_effect(SideEffectClass::FilesystemRead),
                noop,
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_path_field_must_be_declared_string() {
        let mut registry = ToolRegistry::new();
        let err = registry
            .register(
                descriptor("reader")
                    .side_effect(SideEffectClass::FilesystemRead)
                    .path_field("file", AccessMode::Read, PathKind::File),
                noop,
            )
            .unwrap_err();
        assert!(err.to_string().contains("path field 'file'"));
    }

    #[test]
    fn test_listing_shape() {
        let listing = descriptor("echo")
            .side_effect(SideEffectClass::Network)
            .url_field("path")
            .to_listing();
        assert_eq!(listing["name"], "echo");
        assert_eq!(listing["sideEffect"], "network");
        assert_eq!(listing["inputSchema"]["required"], serde_json::json!(["path"]));
    }
}
