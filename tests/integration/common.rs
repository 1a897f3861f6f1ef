//! Common utilities for integration tests.
//!
//! Spawning the controller in-process, managing ports, a fake device and waiting for
//! services to be ready.

use alloc::sync::Arc;
use core::{
    sync::atomic::{AtomicU16, Ordering},
    time::Duration,
};
use std::{env, fs, path::Path, time::Instant};

use axum::{Json, Router, extract::State, routing::post};
use clap::Parser as _;
use reqwest::Client;
use serde_json::{Value, json};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::Mutex,
    task, time,
};

use potline_common::StartBatch;
use potline_controller::cli::Cli as ControllerCli;

static NEXT_PORT: AtomicU16 = AtomicU16::new(10000);

pub(crate) fn get_free_port() -> u16 {
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

/// Guard that aborts the spawned task when dropped.
pub(crate) struct KillOnDrop(task::JoinHandle<()>);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Config for a controller on `port` with an in-memory database.
pub(crate) fn memory_config(port: u16, device_url: Option<&str>) -> String {
    let device = device_url.map_or_else(String::new, |url| format!("url = \"{url}\"\n"));
    format!(
        r#"
        [server]
        port = {port}
        bind = "127.0.0.1"

        [db]
        path = ":memory:"

        [device]
        notify_timeout_ms = 500
        {device}
        "#
    )
}

/// Spawn the controller service from a given config string.
/// Writes the config to a temp file and runs the controller in a task.
pub(crate) fn spawn_controller_with_config(port: u16, config_toml: &str) -> KillOnDrop {
    let tmp = env::temp_dir().join(format!("potline_integration_config_{port}.toml"));
    fs::write(&tmp, config_toml).expect("failed to write config");

    spawn_controller_with_config_file(&tmp)
}

/// Spawn the controller service from a given config file path.
pub(crate) fn spawn_controller_with_config_file(config_path: &Path) -> KillOnDrop {
    let cli = ControllerCli::parse_from([
        "potline",
        "control-service",
        "--config",
        config_path.to_str().unwrap(),
    ]);
    let handle = tokio::spawn(async move {
        // SAFETY: This is only used in integration tests and no user-facing code. It just tells the controller to log less verbose output.
        unsafe {
            env::set_var("POTLINE_INTEGRATION_TEST", "1");
        }
        potline_controller::inner_main(cli)
            .await
            .expect("inner_main failed");
    });
    KillOnDrop(handle)
}

/// Start a controller with an in-memory database and wait until it accepts connections.
pub(crate) async fn start_controller(device_url: Option<&str>) -> (u16, KillOnDrop) {
    let port = get_free_port();
    let child = spawn_controller_with_config(port, &memory_config(port, device_url));
    wait_for_listening(port, 5).await;
    (port, child)
}

/// Block until a TCP listener is accepting on `127.0.0.1:port` or timeout.
pub(crate) async fn wait_for_listening(port: u16, timeout_secs: u64) {
    let start = Instant::now();
    while TcpStream::connect(("127.0.0.1", port)).await.is_err() {
        assert!(
            start.elapsed() <= Duration::from_secs(timeout_secs),
            "server did not start within timeout"
        );
        time::sleep(Duration::from_millis(100)).await;
    }
}

pub(crate) fn api_url(port: u16, path: &str) -> String {
    format!("http://127.0.0.1:{port}/api{path}")
}

/// Create a batch and return the response status and body.
pub(crate) async fn create_batch(client: &Client, port: u16, output_count: i64) -> (u16, Value) {
    let resp = client
        .post(api_url(port, "/batches"))
        .json(&json!({
            "title": "Basil tray",
            "seedType": "basil",
            "outputCount": output_count,
        }))
        .send()
        .await
        .expect("failed to create batch");
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

/// What the fake device has been told so far.
#[derive(Debug, Default, Clone)]
pub(crate) struct DeviceLog {
    pub started: Vec<String>,
    pub stops: usize,
}

/// A fake potting device that records the commands it receives.
pub(crate) async fn spawn_fake_device() -> (String, Arc<Mutex<DeviceLog>>, KillOnDrop) {
    let log = Arc::new(Mutex::new(DeviceLog::default()));

    async fn start(State(log): State<Arc<Mutex<DeviceLog>>>, Json(body): Json<StartBatch>) {
        log.lock().await.started.push(body.batch_id);
    }
    async fn stop(State(log): State<Arc<Mutex<DeviceLog>>>) {
        log.lock().await.stops += 1;
    }

    let app = Router::new()
        .route("/start-batch", post(start))
        .route("/stop-batch", post(stop))
        .with_state(log.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), log, KillOnDrop(handle))
}

/// Poll `check` against the device log until it holds or the timeout passes.
pub(crate) async fn wait_for_device(
    log: &Arc<Mutex<DeviceLog>>,
    check: impl Fn(&DeviceLog) -> bool,
) -> DeviceLog {
    let start = Instant::now();
    loop {
        let snapshot = log.lock().await.clone();
        if check(&snapshot) {
            return snapshot;
        }
        assert!(
            start.elapsed() <= Duration::from_secs(5),
            "device did not receive expected commands, got {snapshot:?}"
        );
        time::sleep(Duration::from_millis(50)).await;
    }
}
