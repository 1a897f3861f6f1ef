//! Uses the single integration test approach.
//!
//! This improves parallelism when running the tests, and reduces the number of binaries that have to be built (and linked)
#![expect(
    clippy::tests_outside_test_module,
    reason = "This is the integration test binary, so it's expected that tests are outside of a test module"
)]
#![expect(clippy::shadow_unrelated, reason = "This is a common pattern in tests")]
#![expect(clippy::unwrap_used, reason = "Using unwrap in tests is fine")]

extern crate alloc;
extern crate core;

mod batches;
mod common;
mod device;
mod websocket;

use core::time::Duration;
use std::{env, fs};

use reqwest::Client;
use serde_json::Value;
use tokio::time;

use common::{
    api_url, create_batch, get_free_port, spawn_controller_with_config, wait_for_listening,
};

#[tokio::test]
async fn controller_config_loads() {
    let port = get_free_port();
    let _child = spawn_controller_with_config(
        port,
        &format!(
            r#"
        [server]
        port = {port}
        bind = "127.0.0.1"

        [db]
        path = ":memory:"
        "#
        ),
    );
    wait_for_listening(port, 2).await;

    let machine: Value = Client::new()
        .get(api_url(port, "/machine-state"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(machine["systemName"], "main");
    assert_eq!(machine["soilLevel"], 1);
    assert_eq!(machine["cupLevel"], 1);
    assert!(machine["activeBatchId"].is_null());
}

#[tokio::test]
async fn batches_persist_across_restarts() {
    let port = get_free_port();
    let db_path = env::temp_dir().join(format!("potline_test_{port}.db"));

    // Ensure clean start
    drop(fs::remove_file(&db_path));

    let config = format!(
        r#"
        [server]
        port = {port}
        bind = "127.0.0.1"

        [db]
        path = "{}"
    "#,
        db_path.to_string_lossy()
    );

    let controller = spawn_controller_with_config(port, &config);
    wait_for_listening(port, 5).await;

    let client = Client::new();
    let (status, batch) = create_batch(&client, port, 3).await;
    assert_eq!(status, 201);

    // Kill controller
    drop(controller);
    time::sleep(Duration::from_secs(1)).await;

    let _controller = spawn_controller_with_config(port, &config);
    wait_for_listening(port, 5).await;

    let machine: Value = client
        .get(api_url(port, "/machine-state"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(machine["activeBatchId"], batch["id"]);

    let fetched: Value = client
        .get(api_url(port, &format!("/batches/{}", batch["id"].as_str().unwrap())))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["status"], "Ongoing");

    // Clean up
    for suffix in ["", "-wal", "-shm"] {
        drop(fs::remove_file(format!("{}{suffix}", db_path.display())));
    }
}
