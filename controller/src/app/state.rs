use alloc::sync::Arc;
use std::path::{Path, PathBuf};

use eyre::WrapErr as _;
use tokio::sync::{broadcast, watch};
use tracing::info;

use crate::{
    app::{
        controller::LineController,
        db::{self, DbPool},
        runtime::start_background_tasks,
    },
    config::{ControllerConfig, load, resolve_config_relative_paths},
    websocket::WsMessage,
};

pub(crate) type ConfigRx = watch::Receiver<Arc<ControllerConfig>>;
pub(super) type ConfigTx = watch::Sender<Arc<ControllerConfig>>;
pub(crate) type WsTx = broadcast::Sender<WsMessage>;

/// Application state shared across request handlers and background tasks.
#[derive(Clone)]
pub(crate) struct AppState {
    /// Path to the configuration file, watched for `[device]` changes.
    pub config_path: PathBuf,

    /// Receiver for updated `ControllerConfig` when the file changes.
    pub config_rx: ConfigRx,

    /// The batch lifecycle controller. All state changes go through it.
    pub controller: Arc<LineController>,

    /// Broadcast sender for distributing WebSocket messages.
    pub ws_tx: WsTx,
}

/// Open the database configured relative to the config file.
#[tracing::instrument(skip_all)]
async fn initialize_database(
    initial_config: &ControllerConfig,
    config_path: &Path,
) -> eyre::Result<DbPool> {
    let db_path = resolve_config_relative_paths(config_path, &initial_config.db.path);
    let pool = db::init(&db_path).await.wrap_err(format!(
        "Failed to initialize database at: {}",
        db_path.display()
    ))?;
    info!(
        "Database initialized at: {} (note: WAL mode creates .db-wal and .db-shm files alongside)",
        db_path.display()
    );
    Ok(pool)
}

/// Initialize application state and start background tasks.
#[tracing::instrument(skip_all)]
pub(super) async fn initialize_state(config_path: &Path) -> eyre::Result<AppState> {
    let initial_config = Arc::new(load(config_path).await?);

    let (config_tx, config_rx) = watch::channel(initial_config.clone());

    let (ws_tx, _) = broadcast::channel(32);

    let pool = initialize_database(&initial_config, config_path).await?;

    let controller = Arc::new(
        LineController::new(pool, config_rx.clone())
            .await
            .wrap_err("Failed to load machine state")?,
    );

    match initial_config.device.url {
        Some(ref url) => info!(%url, "Device pushes enabled"),
        None => info!("No device URL configured; the device has to poll the run signal"),
    }

    let app_state = AppState {
        config_path: config_path.to_path_buf(),
        config_rx,
        controller,
        ws_tx,
    };

    // Start background tasks now that the full AppState is available.
    start_background_tasks(&app_state, &config_tx);

    Ok(app_state)
}
