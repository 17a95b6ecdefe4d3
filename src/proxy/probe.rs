//! Backend dialing and liveness probes
//!
//! Every connection to a mirror host, whether a throwaway probe or a relay
//! connection, goes through [`BackendProber`] so that it is bounded by the same
//! short timeout.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, instrument};

use crate::error::{Result, RelayError};
use crate::models::HostTemplate;

/// Default timeout for probes and backend dials
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(200);

/// Byte stream to a backend host
pub trait BackendStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> BackendStream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Opens connections to backend addresses
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self, addr: &str) -> io::Result<Box<dyn BackendStream>>;
}

/// Plain TCP dialer
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, addr: &str) -> io::Result<Box<dyn BackendStream>> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

/// Dials and probes the hosts of one [`HostTemplate`]
#[derive(Clone)]
pub struct BackendProber {
    dialer: Arc<dyn Dialer>,
    hosts: HostTemplate,
    timeout: Duration,
}

impl BackendProber {
    pub fn new(dialer: Arc<dyn Dialer>, hosts: HostTemplate, timeout: Duration) -> Self {
        Self {
            dialer,
            hosts,
            timeout,
        }
    }

    pub fn hosts(&self) -> &HostTemplate {
        &self.hosts
    }

    pub fn host_count(&self) -> usize {
        self.hosts.count()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connect to the backend at `index`, giving up after the dial timeout
    pub async fn connect(&self, index: usize) -> Result<Box<dyn BackendStream>> {
        if index >= self.hosts.count() {
            return Err(RelayError::IndexOutOfRange {
                index,
                count: self.hosts.count(),
            });
        }

        let addr = self.hosts.address(index);
        match timeout(self.timeout, self.dialer.dial(&addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(RelayError::DialFailed(format!("{}: {}", addr, e))),
            Err(_) => Err(RelayError::Timeout),
        }
    }

    /// Check whether the backend at `index` accepts connections.
    ///
    /// The probe connection is closed right away.
    #[instrument(skip(self))]
    pub async fn probe(&self, index: usize) -> bool {
        match self.connect(index).await {
            Ok(_stream) => {
                info!("Host {} OK ({})", index, self.hosts.address(index));
                true
            }
            Err(e) => {
                info!("Host {} unavailable: {}", index, e);
                false
            }
        }
    }

    /// Probe every host concurrently.
    ///
    /// Returns only once all probes have finished; entry `i` of the result is the
    /// outcome for index `i`.
    pub async fn probe_all(&self) -> Vec<bool> {
        let count = self.hosts.count();
        debug!(
            "Probing {} -- {}",
            self.hosts.address(0),
            self.hosts.address(count - 1)
        );

        let results = futures::stream::iter(0..count)
            .map(|index| async move { (index, self.probe(index).await) })
            .buffer_unordered(count)
            .collect::<Vec<(usize, bool)>>()
            .await;

        let mut table = vec![false; count];
        for (index, reachable) in results {
            table[index] = reachable;
        }
        table
    }
}
