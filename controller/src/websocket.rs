use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use crate::app::{
    AppState,
    model::{Batch, MachineState},
};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", content = "payload")]
pub enum WsMessage {
    /// Send the entire state in the beginning to bootstrap the dashboard.
    Initial {
        machine: MachineState,
        batches: Vec<Batch>,
    },
    /// Gets sent after every machine state change
    MachineState(MachineState),
    /// Gets sent when a batch is created or changes status or progress
    BatchUpdate(Batch),
    BatchDeleted {
        id: String,
    },
}

/// Gets called for every new dashboard client and spins up an event loop
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| start_dashboard_ws_loop(socket, state))
}

async fn send_ws_message(socket: &mut WebSocket, msg: &WsMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!("Failed to serialize websocket message: {}", e);
            Err(axum::Error::new(e))
        }
    }
}

async fn initial_message(state: &AppState) -> Option<WsMessage> {
    let machine = match state.controller.machine_state().await {
        Ok(machine) => machine,
        Err(e) => {
            warn!(%e, "Failed to load machine state for websocket client");
            return None;
        }
    };
    let batches = match state.controller.list_batches().await {
        Ok(batches) => batches,
        Err(e) => {
            warn!(%e, "Failed to load batches for websocket client");
            return None;
        }
    };
    Some(WsMessage::Initial { machine, batches })
}

/// We start one event loop per client
async fn start_dashboard_ws_loop(mut socket: WebSocket, state: AppState) {
    // Subscribe before taking the snapshot so no change falls in between.
    let mut rx: broadcast::Receiver<WsMessage> = state.ws_tx.subscribe();

    let Some(initial_msg) = initial_message(&state).await else {
        return;
    };
    if let Err(e) = send_ws_message(&mut socket, &initial_msg).await {
        warn!("Failed to send initial state: {}", e);
        return;
    }

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Ok(msg) => {
                        if let Err(e) = send_ws_message(&mut socket, &msg).await {
                            warn!("Failed to send message, closing connection: {}", e);
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Websocket client lagged behind, dropped updates");
                    }
                    Err(RecvError::Closed) => {
                        warn!("Broadcast channel closed, stopping WebSocket handler");
                        break;
                    }
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    None | Some(Ok(Message::Close(_)) | Err(_)) => {
                        info!("WebSocket connection closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
