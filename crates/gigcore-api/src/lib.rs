pub mod admin;
pub mod error;
pub mod router;
pub mod state;
pub mod webhook;

use std::net::SocketAddr;
use std::sync::Arc;

pub use error::ApiError;
pub use state::ApiState;

use tracing::info;

/// Binds and serves the router until the process is killed. Mirrors
/// `RpcServer::start`'s shape: build, bind, log, run.
pub async fn serve(state: Arc<ApiState>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router::router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "api server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
