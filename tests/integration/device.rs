//! Integration tests for the device link: commands pushed to the device, heartbeats and
//! liveness.

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use crate::common::{
    api_url, create_batch, get_free_port, spawn_fake_device, start_controller, wait_for_device,
};

#[tokio::test]
async fn device_receives_start_and_stop() {
    let (device_url, log, _device) = spawn_fake_device().await;
    let (port, _controller) = start_controller(Some(&device_url)).await;
    let client = Client::new();

    let (status, batch) = create_batch(&client, port, 5).await;
    assert_eq!(status, 201);
    let id = batch["id"].as_str().unwrap().to_owned();

    let seen = wait_for_device(&log, |log| !log.started.is_empty()).await;
    assert_eq!(seen.started, vec![id.clone()]);

    let resp = client
        .put(api_url(port, &format!("/batches/{id}/cancel")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let seen = wait_for_device(&log, |log| log.stops > 0).await;
    assert_eq!(seen.stops, 1);
}

#[tokio::test]
async fn unreachable_device_does_not_fail_create() {
    // Nothing listens on this port
    let dead_port = get_free_port();
    let (port, _controller) =
        start_controller(Some(&format!("http://127.0.0.1:{dead_port}"))).await;
    let client = Client::new();

    let (status, batch) = create_batch(&client, port, 5).await;
    assert_eq!(status, 201);
    assert_eq!(batch["status"], "Ongoing");
}

#[tokio::test]
async fn heartbeat_brings_device_online() {
    let (port, _controller) = start_controller(None).await;
    let client = Client::new();
    let status_url = api_url(port, "/device-status");

    let liveness: Value = client
        .get(&status_url)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(liveness["state"], "never_connected");
    assert_eq!(liveness["isConnected"], false);

    let resp = client
        .put(&status_url)
        .json(&json!({
            "wifiSSID": "greenhouse",
            "wifiRSSI": -61,
            "ipAddress": "192.168.1.50",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let liveness: Value = client
        .get(&status_url)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(liveness["state"], "online");
    assert_eq!(liveness["isConnected"], true);
    assert_eq!(liveness["wifiSSID"], "greenhouse");
    assert_eq!(liveness["wifiRSSI"], -61);
    assert_eq!(liveness["ipAddress"], "192.168.1.50");
}
