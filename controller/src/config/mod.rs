//! Configuration management for the line controller: loading the TOML config file.
//!
//! This module provides a unified interface to all configuration-related functionality,
//! including data types and loading utilities. Watching for changes lives in the app layer.

mod loader;
mod types;

pub use loader::*;
pub use types::*;
