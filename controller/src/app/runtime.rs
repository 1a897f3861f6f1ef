//! Background tasks for the line controller.

use tokio::sync::broadcast::error::RecvError;
use tracing::{Instrument as _, debug, warn};

use super::state::ConfigTx;
use crate::{
    app::{
        AppState, WsTx,
        config_watcher::watch_config_file,
        controller::{BatchEvent, BatchEventRx, MachineRx},
    },
    websocket::WsMessage,
};

/// Start all background tasks for the HTTP server.
pub(super) fn start_background_tasks(state: &AppState, config_tx: &ConfigTx) {
    // Start config file watcher
    {
        let path = state.config_path.clone();
        let config_tx = config_tx.clone();
        tokio::spawn(
            async move {
                watch_config_file(path, config_tx).await;
            }
            .in_current_span(),
        );
    }

    // Forwards machine state snapshots to the websocket client loops
    {
        let machine_rx = state.controller.subscribe_machine();
        let ws_tx = state.ws_tx.clone();
        tokio::spawn(
            async move {
                forward_machine_updates(machine_rx, ws_tx).await;
            }
            .in_current_span(),
        );
    }

    // Forwards batch changes to the websocket client loops
    {
        let events_rx = state.controller.subscribe_batches();
        let ws_tx = state.ws_tx.clone();
        tokio::spawn(
            async move {
                forward_batch_events(events_rx, ws_tx).await;
            }
            .in_current_span(),
        );
    }
}

async fn forward_machine_updates(mut machine_rx: MachineRx, ws_tx: WsTx) {
    while machine_rx.changed().await.is_ok() {
        let msg = WsMessage::MachineState(machine_rx.borrow_and_update().as_ref().clone());
        if ws_tx.send(msg).is_err() {
            debug!("No Websocket Subscribers");
        }
    }
}

async fn forward_batch_events(mut events_rx: BatchEventRx, ws_tx: WsTx) {
    loop {
        let msg = match events_rx.recv().await {
            Ok(BatchEvent::Updated(batch)) => WsMessage::BatchUpdate(batch),
            Ok(BatchEvent::Deleted(id)) => WsMessage::BatchDeleted { id },
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Batch event forwarder lagged behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        if ws_tx.send(msg).is_err() {
            debug!("No Websocket Subscribers");
        }
    }
}
