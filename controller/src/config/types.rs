//! Configuration data types and structures for the line controller.
//!
//! This module contains all the data structures used for configuration:
//! server binding, database location and the device link.

use core::time::Duration;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

/// HTTP server binding configuration section.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub(crate) struct ServerConfig {
    /// TCP port for the API.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address for the HTTP listener.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Answer CORS preflights for any origin. The web client and the device
    /// firmware's config page are served from other origins.
    #[serde(default = "do_allow_any_origin")]
    pub allow_any_origin: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            allow_any_origin: do_allow_any_origin(),
        }
    }
}

/// Configuration for the local `SQLite` database.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub(crate) struct DbConfig {
    /// Path to the `SQLite` database file. Relative paths are resolved relative to the config file.
    /// `:memory:` keeps everything in memory (lost on restart).
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// How to reach the potting device and how to judge its heartbeat.
///
/// This is the only section that is applied when the config file changes at runtime.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub(crate) struct DeviceConfig {
    /// Base URL of the device's web server, e.g. `http://192.168.1.50`.
    /// When absent, start/stop pushes are skipped and the device relies on polling the run signal.
    #[serde(default)]
    pub url: Option<String>,
    /// Timeout for a single start/stop push.
    #[serde(default = "default_notify_timeout_ms")]
    pub notify_timeout_ms: u64,
    /// Heartbeats younger than this count as online.
    #[serde(default = "default_online_threshold_secs")]
    pub online_threshold_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            url: None,
            notify_timeout_ms: default_notify_timeout_ms(),
            online_threshold_secs: default_online_threshold_secs(),
        }
    }
}

impl DeviceConfig {
    pub(crate) const fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }

    pub(crate) const fn online_threshold(&self) -> Duration {
        Duration::from_secs(self.online_threshold_secs)
    }
}

const fn default_port() -> u16 {
    potline_common::DEFAULT_CONTROLLER_PORT
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

const fn do_allow_any_origin() -> bool {
    true
}

fn default_db_path() -> String {
    "./potline.db".to_string()
}

const fn default_notify_timeout_ms() -> u64 {
    2000
}

const fn default_online_threshold_secs() -> u64 {
    15
}

/// Resolves a path to an absolute one.
///
/// If the path is absolute, returns it as-is. If relative, joins it with the
/// config file's parent directory and normalizes the result to remove redundant
/// components like `./`.
///
/// # Arguments
///
/// * `config_path` - Path to the config file
/// * `relative_path` - Path to resolve (may be absolute or relative)
///
/// # Returns
///
/// A normalized absolute path
pub fn resolve_config_relative_paths(config_path: &Path, relative_path: &str) -> PathBuf {
    let path = Path::new(relative_path);
    if relative_path == ":memory:" {
        // Special case: SQLite in-memory database path
        return path.to_path_buf();
    }
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        config_path
            .parent()
            .map_or_else(|| path.to_path_buf(), |d| d.join(path))
    };

    // We can't use canonicalize() because the file might not exist yet
    normalize_path(&resolved)
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        use Component as C;
        match component {
            C::Normal(c) => {
                result.push(c);
            }
            C::ParentDir => {
                result.pop();
            }
            C::CurDir => {}
            C::RootDir | C::Prefix(_) => {
                result.push(component);
            }
        }
    }
    result
}

/// Root config structure for the line controller.
#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub(crate) struct ControllerConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub device: DeviceConfig,
}
