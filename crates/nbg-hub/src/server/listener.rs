//! HTTP listener

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::router;
use crate::state::HubState;

/// Loopback HTTP server fronted by the edge proxy
pub struct HubServer {
    /// Shared hub state
    state: Arc<HubState>,
    /// Cancellation token for graceful shutdown
    cancel: CancellationToken,
}

impl HubServer {
    pub fn new(state: Arc<HubState>, cancel: CancellationToken) -> Self {
        Self { state, cancel }
    }

    /// Bind `bind_addr` and serve until cancelled
    pub async fn run(&self, bind_addr: &str) -> Result<()> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", bind_addr))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!("Hub listening on {}", local_addr);

        let cancel = self.cancel.clone();
        let app = router(Arc::clone(&self.state));
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("HTTP server failed")?;

        tracing::info!("Hub server shutting down");
        Ok(())
    }
}
