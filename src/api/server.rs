//! Status server lifecycle: bind, spawn the axum server in a background
//! tokio task, return a handle with a shutdown channel.

use std::net::SocketAddr;

use tokio::sync::oneshot;

use crate::api::router::status_router;
use crate::api::types::ApiContext;

/// Handle to a running status server.
pub struct StatusServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl StatusServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shut down the server gracefully.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("Status server shutdown signal sent");
        }
    }
}

impl Drop for StatusServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Bind `addr` (port 0 picks an ephemeral port) and serve the status router.
pub async fn start_status_server(
    ctx: ApiContext,
    addr: SocketAddr,
) -> Result<StatusServer, std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;
    let app = status_router(ctx);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
        };

        tracing::info!(%addr, "Status server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("Status server error: {e}");
        }

        tracing::info!("Status server stopped");
    });

    Ok(StatusServer {
        addr,
        shutdown_tx: Some(shutdown_tx),
    })
}
