//! Configuration file watching and reloading utilities.
//!
//! Only the `[device]` section is applied at runtime; the device tends to get a new
//! address from DHCP, everything else needs a restart.

use alloc::sync::Arc;
use std::{
    fs,
    path::{Path, PathBuf},
};

use eyre::{Result, WrapErr as _};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{error, info, warn};

use super::state::{ConfigRx, ConfigTx};
use crate::config::{self, ControllerConfig};

/// What a freshly loaded config means for the running service.
#[derive(Debug, PartialEq, Eq)]
enum ReloadOutcome {
    /// The `[device]` section changed and is applied.
    Apply(ControllerConfig),
    /// Only sections that need a restart changed.
    Unsupported,
    Unchanged,
}

fn classify_change(prev: &ControllerConfig, new_config: ControllerConfig) -> ReloadOutcome {
    let effective = ControllerConfig {
        device: new_config.device.clone(),
        ..prev.clone()
    };
    let uneffective_change = effective != new_config;
    if uneffective_change {
        warn!(
            "Detected change outside of [device] during runtime. Such changes are unsupported and will be ignored."
        );
    }

    if new_config.device != prev.device {
        ReloadOutcome::Apply(effective)
    } else if uneffective_change {
        ReloadOutcome::Unsupported
    } else {
        ReloadOutcome::Unchanged
    }
}

/// Reload the configuration file and publish the applicable part of it.
///
/// # Arguments
///
/// * `path` - The path to the configuration file.
/// * `tx` - The sender part of a watch channel for broadcasting configuration updates.
/// * `rx` - The receiver part of a watch channel for reading the current configuration state.
async fn process_config_change(path: &Path, tx: &ConfigTx, rx: &ConfigRx) -> Result<()> {
    info!("Config file modified. Reloading...");
    let prev = rx.borrow().clone();
    let new_config = config::load(path)
        .await
        .wrap_err(format!("Failed to reload config at: {}", path.display()))?;

    match classify_change(&prev, new_config) {
        ReloadOutcome::Apply(effective) => {
            tx.send(Arc::new(effective))
                .wrap_err("Failed to send updated config through watch channel")?;
            info!("Applied [device] changes from config file.");
        }
        ReloadOutcome::Unsupported => {
            info!("No applicable ([device]) changes detected; ignoring unsupported updates.");
        }
        ReloadOutcome::Unchanged => info!("No changes detected in config."),
    }
    Ok(())
}

/// Watches a config file for modifications and updates the provided channel on changes.
///
/// # Arguments
///
/// * `path` - Path to the config file to watch.
/// * `tx` - Watch channel sender to broadcast new config instances.
pub(super) async fn watch_config_file(path: PathBuf, tx: ConfigTx) {
    let (raw_tx, mut raw_rx) = unbounded_channel::<Event>();

    let watcher = RecommendedWatcher::new(
        move |res| {
            if let Ok(event) = res
                && raw_tx.send(event).is_err()
            {
                error!("Failed to send event to config watcher channel");
            }
        },
        notify::Config::default(),
    );
    let mut watcher = match watcher {
        Ok(w) => w,
        Err(e) => {
            error!(
                ?e,
                "Failed to create config file watcher, live reload disabled"
            );
            return;
        }
    };

    let Some(dir) = path.parent() else {
        error!(path = %path.display(), "Config file has no parent directory, live reload disabled");
        return;
    };
    if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
        error!(?e, "Failed to watch config directory, live reload disabled");
        return;
    }

    // Receiver used to read the current effective config for change comparisons
    let rx = tx.subscribe();

    let Some(config_filename) = path.file_name().map(ToOwned::to_owned) else {
        return;
    };

    while let Some(event) = raw_rx.recv().await {
        if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            // We check both exact path match and filename match (for atomic writes)
            let matches_config = event.paths.iter().any(|event_path| {
                if event_path == &path {
                    return true;
                }
                if let (Ok(canonical_event), Ok(canonical_config)) =
                    (fs::canonicalize(event_path), fs::canonicalize(&path))
                    && canonical_event == canonical_config
                {
                    return true;
                }
                event_path
                    .file_name()
                    .is_some_and(|name| name == config_filename)
            });

            if matches_config && let Err(e) = process_config_change(&path, &tx, &rx).await {
                error!(?e, "Failed to process config change");
            }
        }
    }
}
