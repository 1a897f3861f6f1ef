//! Integration tests for websocket functionality

use core::time::Duration;

use futures_util::StreamExt as _;
use reqwest::Client;
use serde_json::json;
use tokio::time;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use potline_controller::{BatchStatus, ResourceLevel, WsMessage};

use crate::common::{api_url, create_batch, start_controller};

async fn next_ws_message<S>(read: &mut S) -> WsMessage
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = time::timeout(Duration::from_secs(5), read.next())
            .await
            .expect("timed out waiting for websocket message")
            .unwrap()
            .unwrap();
        if msg.is_text() {
            return serde_json::from_str(msg.to_text().unwrap()).unwrap();
        }
    }
}

#[tokio::test]
async fn websocket_streams_batch_and_machine_updates() {
    let (port, _controller) = start_controller(None).await;
    let client = Client::new();

    let (_, first) = create_batch(&client, port, 2).await;

    // Connect websocket client
    let url = format!("ws://127.0.0.1:{port}/ws");
    let (ws_stream, _) = connect_async(url)
        .await
        .expect("failed to connect websocket");
    let (_write, mut read) = ws_stream.split();

    match next_ws_message(&mut read).await {
        WsMessage::Initial { machine, batches } => {
            assert_eq!(machine.active_batch_id.as_deref(), first["id"].as_str());
            assert_eq!(batches.len(), 1);
        }
        other => panic!("Expected Initial message, got {other:?}"),
    }

    client
        .put(api_url(port, "/machine-state"))
        .json(&json!({"cupLevel": 0}))
        .send()
        .await
        .unwrap();

    // Updates from creating the batch may still be in flight, so skip until the new state shows.
    let mut saw_machine = false;
    let mut saw_pause = false;
    while !(saw_machine && saw_pause) {
        match next_ws_message(&mut read).await {
            WsMessage::MachineState(machine) if machine.cup_level == ResourceLevel::Depleted => {
                saw_machine = true;
            }
            WsMessage::BatchUpdate(batch) if batch.status == BatchStatus::Paused => {
                assert_eq!(batch.id, first["id"].as_str().unwrap());
                saw_pause = true;
            }
            WsMessage::Initial { .. } | WsMessage::BatchDeleted { .. } => {
                panic!("Unexpected message")
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn websocket_announces_deletions() {
    let (port, _controller) = start_controller(None).await;
    let client = Client::new();

    let (_, batch) = create_batch(&client, port, 2).await;
    let id = batch["id"].as_str().unwrap().to_owned();
    client
        .put(api_url(port, &format!("/batches/{id}/cancel")))
        .send()
        .await
        .unwrap();

    let (ws_stream, _) = connect_async(format!("ws://127.0.0.1:{port}/ws"))
        .await
        .expect("failed to connect websocket");
    let (_write, mut read) = ws_stream.split();
    assert!(matches!(
        next_ws_message(&mut read).await,
        WsMessage::Initial { .. }
    ));

    client
        .delete(api_url(port, &format!("/batches/{id}")))
        .send()
        .await
        .unwrap();

    let deleted = time::timeout(Duration::from_secs(5), async {
        loop {
            if let WsMessage::BatchDeleted { id: deleted } = next_ws_message(&mut read).await {
                return deleted;
            }
        }
    })
    .await
    .expect("no deletion announced");
    assert_eq!(deleted, id);
}
