//! Library entry for the `potline_controller` crate.
//!
//! Exposes `inner_main` so the workspace-level shim binary and the integration tests can
//! call into the controller logic.

extern crate alloc;
extern crate core;

pub mod app;
pub mod cli;
pub mod config;
pub mod http;
pub mod websocket;

// for use in integration tests
pub use app::model::{Batch, BatchStatus, MachineState, ResourceLevel};
pub use websocket::WsMessage;

use std::{env, fs, sync::Once};

use eyre::{Result, WrapErr as _};
use tracing::{Instrument as _, info};
use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};

use cli::{Cli, Command, LogFormat};

use crate::app::start;

static INIT_TRACING: Once = Once::new();

/// The controller's main function; can be called from a shim binary.
///
/// # Errors
///
/// Returns an error if the config file is missing or the server fails to start.
pub async fn inner_main(invocation: Cli) -> Result<()> {
    match invocation.command {
        Command::ControlService(args) => {
            let config = &args.config;
            let config_path =
                fs::canonicalize(config).wrap_err(format!("Config file not found at: {config}"))?;

            let log_format = args.log_format;
            INIT_TRACING.call_once(move || {
                let default_level = if env::var("POTLINE_INTEGRATION_TEST").is_ok() {
                    "error"
                } else {
                    "info"
                };

                let builder = tracing_subscriber::fmt()
                    .with_env_filter(
                        EnvFilter::try_from_default_env()
                            .unwrap_or_else(|_| EnvFilter::new(default_level)),
                    )
                    .with_timer(ChronoLocal::rfc_3339());

                match log_format {
                    LogFormat::Compact => builder.compact().init(),
                    LogFormat::Json => builder.json().init(),
                    LogFormat::Pretty => builder.pretty().init(),
                }
            });

            let startup_span = tracing::info_span!("potline.startup", ?config_path, pid=?std::process::id(), version = env!("CARGO_PKG_VERSION"));

            info!(parent: &startup_span, "Starting line controller");

            // Pass through optional port/bind overrides from CLI
            start(&config_path, args.port, args.bind.as_deref())
                .instrument(startup_span)
                .await?;
            Ok(())
        }
    }
}
