//! Best-effort push of start/stop commands to the potting device.
//!
//! The persisted run signal is what the device ultimately follows; these pushes only
//! save it a polling round-trip. Failures are logged and never reach the caller.

use thiserror::Error as ThisError;
use tracing::{Instrument as _, debug, error, info};

use potline_common::{DeviceCommand, StartBatch};

use crate::{app::ConfigRx, config::DeviceConfig};

/// Reasons a push to the device did not go through.
#[derive(Debug, ThisError)]
pub(crate) enum DeviceError {
    #[error("Failed to reach device for {command} at {url}")]
    Unreachable {
        command: DeviceCommand,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Device answered {command} at {url} with {status}")]
    Rejected {
        command: DeviceCommand,
        url: String,
        status: reqwest::StatusCode,
    },
}

/// Handle for sending commands to the device. Cheap to clone.
#[derive(Clone)]
pub(crate) struct DeviceLink {
    client: reqwest::Client,
    config_rx: ConfigRx,
}

impl DeviceLink {
    pub(crate) fn new(config_rx: ConfigRx) -> Self {
        Self {
            client: reqwest::Client::new(),
            config_rx,
        }
    }

    /// Fire-and-forget: tell the device to start working on `batch_id`.
    pub(crate) fn dispatch_start(&self, batch_id: &str) {
        self.dispatch(
            DeviceCommand::Start,
            Some(StartBatch {
                batch_id: batch_id.to_owned(),
            }),
        );
    }

    /// Fire-and-forget: tell the device to stop.
    pub(crate) fn dispatch_stop(&self) {
        self.dispatch(DeviceCommand::Stop, None);
    }

    fn dispatch(&self, command: DeviceCommand, body: Option<StartBatch>) {
        let settings = self.config_rx.borrow().device.clone();
        if settings.url.is_none() {
            debug!(%command, "No device URL configured, skipping push");
            return;
        }
        let link = self.clone();
        tokio::spawn(
            async move {
                match link.send(&settings, command, body.as_ref()).await {
                    Ok(()) => info!(%command, "Device acknowledged command"),
                    Err(e) => error!(error = ?e, "Failed to notify device, it will pick up the run signal on its next poll"),
                }
            }
            .in_current_span(),
        );
    }

    /// Send one command, bounded by the configured timeout.
    async fn send(
        &self,
        settings: &DeviceConfig,
        command: DeviceCommand,
        body: Option<&StartBatch>,
    ) -> Result<(), DeviceError> {
        let Some(ref base) = settings.url else {
            return Ok(());
        };
        let url = format!("{}/{}", base.trim_end_matches('/'), command.path());
        debug!(%url, "Pushing command to device");

        let mut request = self.client.post(&url).timeout(settings.notify_timeout());
        if let Some(payload) = body {
            request = request.json(payload);
        }

        let response = request
            .send()
            .await
            .map_err(|source| DeviceError::Unreachable {
                command,
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeviceError::Rejected {
                command,
                url,
                status,
            })
        }
    }
}
