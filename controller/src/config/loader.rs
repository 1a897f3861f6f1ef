//! Configuration loading utilities for the line controller.
//!
//! This module provides functions for reading and parsing
//! configuration files from disk.

use std::path::Path;

use eyre::WrapErr as _;
use tokio::fs;

use crate::config::ControllerConfig;

/// Reads and parses the controller config from a TOML file.
///
/// # Arguments
///
/// * `path` - File path to the TOML configuration file.
///
/// # Errors
///
/// Returns an error if the config file cannot be read or parsed.
pub(crate) async fn load<P: AsRef<Path>>(path: P) -> eyre::Result<ControllerConfig> {
    let path_ref = path.as_ref();
    let content = fs::read_to_string(&path).await.wrap_err(format!(
        "Failed to read config file at: {}",
        path_ref.display()
    ))?;
    let config: ControllerConfig = toml::from_str(&content).wrap_err(format!(
        "Failed to parse config as TOML at: {}",
        path_ref.display()
    ))?;
    Ok(config)
}
