//! Read-only resources and prompt templates offered next to the tools.

pub mod prompts;
pub mod resources;

use thiserror::Error;

use crate::types::Error;

pub use prompts::{PromptArgument, PromptCatalog, PromptMessage, PromptTemplate, RenderedPrompt};
pub use resources::{Resource, ResourceCatalog, ResourceSource, STATUS_URI};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("resource '{0}' is already registered")]
    DuplicateResource(String),

    #[error("resource not found: {0}")]
    UnknownResource(String),

    #[error("prompt '{0}' is already registered")]
    DuplicatePrompt(String),

    #[error("prompt not found: {0}")]
    UnknownPrompt(String),

    #[error("prompt '{prompt}' requires argument '{argument}'")]
    MissingArgument { prompt: String, argument: String },
}

impl From<CatalogError> for Error {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::DuplicateResource(_) | CatalogError::DuplicatePrompt(_) => {
                Error::already_exists(err.to_string())
            }
            CatalogError::UnknownResource(_) | CatalogError::UnknownPrompt(_) => {
                Error::not_found(err.to_string())
            }
            CatalogError::MissingArgument { .. } => Error::validation(err.to_string()),
        }
    }
}
