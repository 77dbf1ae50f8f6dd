use std::future::Future;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::http::connection::{Connection, ConnectionContext};
use crate::server::signal::Connections;

/// Poll interval while waiting for connections to drain.
const DRAIN_POLL: Duration = Duration::from_millis(100);

/// Accepts connections until `shutdown` resolves, then drains.
///
/// Draining stops the accept loop, raises the worker's stop flag (idle
/// connections close, busy ones lose keep-alive), and waits until every
/// connection is gone or `shutdown_timeout` has passed.
pub async fn serve<F>(
    listener: TcpListener,
    ctx: ConnectionContext,
    connections: Connections,
    shutdown_timeout: Duration,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on {}", addr);
    }

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                };
                debug!("Accepted connection from {}", peer);

                let guard = connections.track();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let _guard = guard;
                    let mut conn = Connection::new(socket, Some(peer), &ctx);
                    if let Err(e) = conn.run().await {
                        error!("Connection error from {}: {}", peer, e);
                    }
                });
            }
            _ = &mut shutdown => {
                info!("Stopping worker");
                break;
            }
        }
    }

    drop(listener);
    ctx.signal.stop();
    drain(&connections, shutdown_timeout).await;
    Ok(())
}

async fn drain(connections: &Connections, shutdown_timeout: Duration) {
    let deadline = Instant::now() + shutdown_timeout;
    while !connections.is_empty() {
        if Instant::now() >= deadline {
            warn!(remaining = connections.len(), "Shutdown timeout reached, dropping connections");
            return;
        }
        tokio::time::sleep(DRAIN_POLL).await;
    }
    debug!("All connections drained");
}
