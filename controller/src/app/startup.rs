use alloc::string;
use core::net::{IpAddr, SocketAddr};
use std::path::Path;

use tokio::{net, signal};

use crate::{
    app::{AppState, state},
    http::router,
};

/// Creates a future that resolves when a shutdown signal is received.
pub(crate) async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to create SIGTERM signal handler");
        tokio::select! {
            _ = sigterm.recv() => {}
            res = signal::ctrl_c() => drop(res),
        }
    }
    #[cfg(not(unix))]
    {
        drop(signal::ctrl_c().await);
    }
}

/// Serve the API until a shutdown signal arrives.
pub(crate) async fn start_server(
    app_state: AppState,
    listen_ip: IpAddr,
    listen_port: u16,
) -> eyre::Result<()> {
    let app = router::create_app(app_state);

    let addr = SocketAddr::from((listen_ip, listen_port));

    tracing::info!("Listening on http://{}", addr);
    let listener = net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            tracing::info!("Received shutdown, shutting down");
        })
        .await?;

    Ok(())
}

/// # Returns
///
/// `Ok(())` when the server runs until termination, or an error if binding or setup fails.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded, the database cannot be opened, or the server cannot bind.
pub(crate) async fn start(
    config_path: &Path,
    port_override: Option<u16>,
    bind_override: Option<&str>,
) -> eyre::Result<()> {
    tracing::info!("Starting HTTP server...");

    let app_state = state::initialize_state(config_path).await?;

    // Apply optional overrides from CLI/tests
    let listen_port = port_override.unwrap_or(app_state.config_rx.borrow().server.port);
    let bind_str = bind_override.map_or_else(
        || app_state.config_rx.borrow().server.bind.clone(),
        string::ToString::to_string,
    );

    let listen_ip: IpAddr = bind_str.parse()?;

    start_server(app_state, listen_ip, listen_port).await
}
