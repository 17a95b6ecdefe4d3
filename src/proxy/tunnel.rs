//! CONNECT tunnel splicing
//!
//! Once both sides of a CONNECT exchange have been upgraded, bytes are copied in
//! each direction by its own task until the source side reaches EOF.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handles CONNECT tunnels
pub struct TunnelHandler;

impl TunnelHandler {
    /// Splice `client` and `backend` together.
    ///
    /// Each direction runs in its own task and shuts down its destination's write
    /// side when its source is exhausted. The handles resolve to the number of
    /// bytes copied client→backend and backend→client.
    pub fn splice<C, B>(client: C, backend: B) -> (JoinHandle<u64>, JoinHandle<u64>)
    where
        C: AsyncRead + AsyncWrite + Send + 'static,
        B: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (client_read, client_write) = tokio::io::split(client);
        let (backend_read, backend_write) = tokio::io::split(backend);

        let upstream = tokio::spawn(copy_and_close(client_read, backend_write, "client -> backend"));
        let downstream =
            tokio::spawn(copy_and_close(backend_read, client_write, "backend -> client"));

        (upstream, downstream)
    }
}

async fn copy_and_close<R, W>(mut reader: R, mut writer: W, direction: &'static str) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let copied = match tokio::io::copy(&mut reader, &mut writer).await {
        Ok(n) => n,
        Err(e) => {
            debug!("Tunnel {} copy ended: {}", direction, e);
            0
        }
    };

    if let Err(e) = writer.shutdown().await {
        warn!("Error closing tunnel {}: {}", direction, e);
    }

    debug!(bytes = copied, "Tunnel {} closed", direction);
    copied
}
