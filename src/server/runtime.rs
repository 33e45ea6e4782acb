//! Runtime lifecycle: bind, serve, auto-exit and shutdown.

use anyhow::{Context, Result};
use axum::Router;
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use crate::common::AppConfig;
use crate::session::Session;

const PHASE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Bind on all interfaces. Port 0 lets the OS pick; the bound port is returned.
pub fn bind(port: u16) -> Result<(TcpListener, u16)> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).with_context(|| {
        format!(
            "Failed to bind to port {} - port already in use.\n\n\
             Is another shareport instance running?\n\
             Or is another service using this port?",
            port
        )
    })?;

    listener
        .set_nonblocking(true)
        .context("Failed to set listener to non-blocking mode")?;

    let port = listener.local_addr()?.port();
    Ok((listener, port))
}

/// Serve `app` until Ctrl+C or, with auto-exit on, until the session ends.
pub async fn run(
    listener: TcpListener,
    app: Router,
    session: Session,
    config: &AppConfig,
) -> Result<()> {
    let handle = axum_server::Handle::new();

    let signal_handle = handle.clone();
    let ctrl_c_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("Failed to listen for Ctrl+C");
            return;
        }
        tracing::info!("Ctrl+C received - initiating graceful shutdown");
        signal_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    let auto_exit_task = config.auto_exit.then(|| {
        let exit_handle = handle.clone();
        let delay = config.auto_exit_delay();
        tokio::spawn(async move {
            wait_for_terminal(&session, PHASE_POLL_INTERVAL).await;
            // Let the final response and events reach the peer
            tokio::time::sleep(delay).await;
            tracing::info!(phase = ?session.phase(), "Transfer finished, shutting down");
            exit_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        })
    });

    let served = axum_server::from_tcp(listener)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("Server error");

    ctrl_c_task.abort();
    if let Some(task) = auto_exit_task {
        task.abort();
    }

    served?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Resolve once the session reaches `completed`, `cancelled` or `error`.
pub async fn wait_for_terminal(session: &Session, poll: Duration) {
    let mut ticker = tokio::time::interval(poll);
    loop {
        ticker.tick().await;
        if session.phase().is_terminal() {
            return;
        }
    }
}
