//! Relay of one client request to a Sogou mirror host
//!
//! The handler picks a backend from the pool, signs the request, forwards it and
//! hands the backend's answer back to the client. A successful CONNECT turns the
//! client and backend connections into a spliced tunnel.

use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use hyper::upgrade::OnUpgrade;
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Result, RelayError};
use crate::proxy::middleware::{request_host, SogouAuth};
use crate::proxy::pool::PoolHandle;
use crate::proxy::probe::{BackendProber, BackendStream};
use crate::proxy::tunnel::TunnelHandler;

/// Body type of every response handed back to clients
pub type RelayBody = BoxBody<Bytes, hyper::Error>;

/// Per-request relay logic shared by all client connections
pub struct RelayHandler {
    pool: PoolHandle,
    prober: BackendProber,
    auth: SogouAuth,
}

impl RelayHandler {
    pub fn new(pool: PoolHandle, prober: BackendProber, auth: SogouAuth) -> Self {
        Self {
            pool,
            prober,
            auth,
        }
    }

    /// Relay one request
    #[instrument(skip(self, req), fields(method = %req.method(), uri = %req.uri()))]
    pub async fn handle(
        &self,
        mut req: Request<Incoming>,
        client_addr: SocketAddr,
    ) -> Result<Response<RelayBody>> {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let is_connect = method == Method::CONNECT;

        let (index, backend) = self.dial_backend().await?;

        self.auth.sign(&mut req, chrono::Utc::now().timestamp())?;
        if !is_connect {
            to_absolute_form(&mut req)?;
        }

        // The tunnel needs raw ownership of the client connection
        let client_upgrade = req.extensions_mut().remove::<OnUpgrade>();
        if is_connect && client_upgrade.is_none() {
            error!("Client connection doesn't support hijacking");
            return Err(RelayError::HijackUnsupported);
        }

        let (mut sender, conn) = hyper::client::conn::http1::Builder::new()
            .preserve_header_case(true)
            .title_case_headers(true)
            .handshake::<_, Incoming>(TokioIo::new(backend))
            .await
            .map_err(|e| RelayError::BackendHandshake(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = conn.with_upgrades().await {
                debug!("Backend connection ended: {}", e);
            }
        });

        let mut response = sender
            .send_request(req)
            .await
            .map_err(|e| RelayError::BackendResponse(format!("h{}: {}", index, e)))?;

        info!(
            "{} {} {} <- {}",
            client_addr,
            method,
            uri,
            response.status()
        );

        match client_upgrade {
            Some(client_upgrade) if is_connect && response.status() == StatusCode::OK => {
                let backend_upgrade = hyper::upgrade::on(&mut response);
                Ok(self.open_tunnel(response, client_upgrade, backend_upgrade))
            }
            _ => {
                let mut response = response.map(|body| body.boxed());
                response
                    .headers_mut()
                    .insert(CONNECTION, HeaderValue::from_static("close"));
                Ok(response)
            }
        }
    }

    /// Ask the pool for backends until one accepts a connection.
    ///
    /// Failed hosts are reported back to the pool; there is no retry limit since
    /// the pool blocks on re-probing once every host has failed.
    async fn dial_backend(&self) -> Result<(usize, Box<dyn BackendStream>)> {
        loop {
            let index = self.pool.select().await?;
            match self.prober.connect(index).await {
                Ok(stream) => {
                    info!("Dial to h{}: ok", index);
                    return Ok((index, stream));
                }
                Err(e) => {
                    warn!("Dial to h{}: failed. {}", index, e);
                    self.pool.disable(index).await?;
                }
            }
        }
    }

    /// Forward the backend's `200` to the client and splice both connections once
    /// hyper has released them.
    fn open_tunnel(
        &self,
        response: Response<Incoming>,
        client_upgrade: OnUpgrade,
        backend_upgrade: OnUpgrade,
    ) -> Response<RelayBody> {
        tokio::spawn(async move {
            match tokio::try_join!(client_upgrade, backend_upgrade) {
                Ok((client, backend)) => {
                    TunnelHandler::splice(TokioIo::new(client), TokioIo::new(backend));
                }
                Err(e) => {
                    debug!("CONNECT upgrade failed: {}", e);
                }
            }
        });

        let (mut parts, _body) = response.into_parts();
        parts.headers.remove(CONTENT_LENGTH);
        parts.headers.remove(TRANSFER_ENCODING);
        Response::from_parts(parts, empty())
    }
}

/// Rewrite an origin-form target (`/path`) into the absolute form a proxy expects
fn to_absolute_form<B>(req: &mut Request<B>) -> Result<()> {
    if req.uri().scheme().is_some() {
        return Ok(());
    }

    let host = request_host(req)
        .ok_or_else(|| RelayError::InvalidRequest("Missing host".to_string()))?;
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let uri: Uri = format!("http://{}{}", host, path)
        .parse()
        .map_err(|e| RelayError::InvalidRequest(format!("Invalid target: {}", e)))?;
    *req.uri_mut() = uri;
    Ok(())
}

/// Empty response body
pub fn empty() -> RelayBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

/// Plain-text response body
pub fn full<T: Into<Bytes>>(chunk: T) -> RelayBody {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Create an error response; the client connection closes after it
pub fn error_response(status: StatusCode, message: &str) -> Response<RelayBody> {
    let mut response = Response::new(full(message.to_string()));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        hyper::header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::pool::{HostPool, PoolConfig};
    use crate::proxy::probe::testing::{template, FakeDialer};
    use crate::proxy::probe::DEFAULT_PROBE_TIMEOUT;
    use hyper::header::HOST;
    use std::sync::Arc;
    use std::time::Duration;

    fn handler_with(dialer: Arc<FakeDialer>, count: usize) -> RelayHandler {
        let prober = BackendProber::new(dialer, template(count), DEFAULT_PROBE_TIMEOUT);
        let pool = HostPool::spawn(
            prober.clone(),
            PoolConfig {
                refresh_interval: Duration::from_secs(3600),
                retry_backoff: Duration::from_millis(10),
                seed: Some(11),
            },
        );
        RelayHandler::new(pool, prober, SogouAuth::default())
    }

    #[test]
    fn test_to_absolute_form_uses_host_header() {
        let mut req = Request::builder()
            .uri("/search?q=rust")
            .header(HOST, "example.com")
            .body(())
            .unwrap();
        to_absolute_form(&mut req).unwrap();
        assert_eq!(req.uri(), "http://example.com/search?q=rust");
    }

    #[test]
    fn test_to_absolute_form_keeps_absolute_uri() {
        let mut req = Request::builder()
            .uri("http://example.com:8080/a")
            .header(HOST, "other.example")
            .body(())
            .unwrap();
        to_absolute_form(&mut req).unwrap();
        assert_eq!(req.uri(), "http://example.com:8080/a");
    }

    #[test]
    fn test_to_absolute_form_requires_host() {
        let mut req = Request::builder().uri("/").body(()).unwrap();
        assert!(matches!(
            to_absolute_form(&mut req),
            Err(RelayError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_error_response() {
        let response = error_response(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(hyper::header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(response.headers().get(CONNECTION).unwrap(), "close");
    }

    #[tokio::test]
    async fn test_dial_backend_disables_failed_host_and_retries() {
        let dialer = Arc::new(FakeDialer::new());
        let handler = handler_with(dialer.clone(), 2);
        assert_eq!(handler.pool.available().await.unwrap(), vec![0, 1]);

        // h0 dies after the initial probe
        dialer.set_down("h0.test:80");
        for _ in 0..10 {
            let (index, _stream) = handler.dial_backend().await.unwrap();
            assert_eq!(index, 1);
        }
        assert_eq!(handler.pool.available().await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_dial_backend_recovers_after_all_hosts_fail() {
        let dialer = Arc::new(FakeDialer::new());
        let handler = handler_with(dialer.clone(), 2);
        assert_eq!(handler.pool.available().await.unwrap(), vec![0, 1]);

        // Both hosts die, then h1 comes back before the pool re-probes
        dialer.set_down("h0.test:80");
        dialer.set_down("h1.test:80");
        let recover = {
            let dialer = dialer.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                dialer.set_up("h1.test:80");
            })
        };

        let (index, _stream) = handler.dial_backend().await.unwrap();
        assert_eq!(index, 1);
        recover.await.unwrap();
    }
}
