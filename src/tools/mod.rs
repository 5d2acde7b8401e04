//! Tool infrastructure: argument schemas, the handler contract, and the
//! registry that pairs descriptors with handlers.

pub mod handler;
pub mod registry;
pub mod schema;

pub use handler::{CallContext, HandlerError, ToolHandler};
pub use registry::{
    PathField, RegisteredTool, RegistryError, SideEffectClass, ToolDescriptor, ToolRegistry,
};
pub use schema::{validate, Property, Schema, SchemaType, ValidatedArguments, ValidationError};
