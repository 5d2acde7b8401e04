//! Built-in tool set.
//!
//! - **calc**: arithmetic and unit conversion (pure)
//! - **files**: sandboxed text file read/write/list
//! - **web**: page fetch, search, download (network)
//! - **data**: CSV statistics, JSON inspection, reports

pub mod calc;
pub mod data;
pub mod files;
pub mod web;

use crate::tools::ToolRegistry;
use crate::types::{Config, Result};

/// Register every built-in tool. Fails on the first name collision.
pub fn register_all(registry: &mut ToolRegistry, config: &Config) -> Result<()> {
    calc::register(registry)?;
    files::register(registry)?;
    web::register(registry, &config.web)?;
    data::register(registry, &config.sandbox)?;
    Ok(())
}
