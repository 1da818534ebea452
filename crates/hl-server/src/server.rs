//! TCP transport: accept loop spawning one connection actor per socket.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::service::ChatService;
use crate::session::serve_connection;

/// Accept connections until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    service: Arc<ChatService>,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    info!(addr = %listener.local_addr()?, "listening");
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(%peer, error = %e, "set_nodelay failed");
                }
                let service = service.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, service).await {
                        debug!(%peer, error = %e, "connection ended with error");
                    }
                });
            }
        }
    }
}
