//! Sogou authentication headers
//!
//! Every request forwarded to a mirror host carries a timestamp, a tag over
//! `timestamp + host + client id`, and a static credential.

use hyper::header::{HeaderName, HeaderValue, HOST};
use hyper::Request;
use tracing::debug;

use crate::error::{Result, RelayError};
use crate::proxy::tag::tag_hex;

pub const TIMESTAMP_HEADER: HeaderName = HeaderName::from_static("x-sogou-timestamp");
pub const TAG_HEADER: HeaderName = HeaderName::from_static("x-sogou-tag");
pub const AUTH_HEADER: HeaderName = HeaderName::from_static("x-sogou-auth");

/// Client identifier mixed into every tag
pub const DEFAULT_CLIENT_ID: &str = "SogouExplorerProxy";

/// Static credential of the 4.1.3.8107 browser build
pub const DEFAULT_CREDENTIAL: &str = "58C41A7C258CAB58167E110BB5DEF7AF/4.1.3.8107/md5";

/// Signs outbound requests for the mirror hosts
#[derive(Clone, Debug)]
pub struct SogouAuth {
    client_id: String,
    credential: HeaderValue,
}

impl SogouAuth {
    pub fn new(client_id: impl Into<String>, credential: &str) -> Result<Self> {
        let credential = HeaderValue::from_str(credential)
            .map_err(|e| RelayError::InvalidConfig(format!("invalid credential: {}", e)))?;
        Ok(Self {
            client_id: client_id.into(),
            credential,
        })
    }

    /// Add the timestamp, tag and credential headers for a request sent at `unix_secs`
    pub fn sign<B>(&self, req: &mut Request<B>, unix_secs: i64) -> Result<()> {
        let host = request_host(req)
            .ok_or_else(|| RelayError::InvalidRequest("Missing host".to_string()))?;

        let timestamp = format!("{:08x}", unix_secs);
        let tag = tag_hex(&format!("{}{}{}", timestamp, host, self.client_id));
        debug!(host = %host, timestamp = %timestamp, tag = %tag, "Signing request");

        let headers = req.headers_mut();
        headers.append(TIMESTAMP_HEADER, header_value(&timestamp)?);
        headers.append(TAG_HEADER, header_value(&tag)?);
        headers.append(AUTH_HEADER, self.credential.clone());
        Ok(())
    }
}

impl Default for SogouAuth {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            credential: HeaderValue::from_static(DEFAULT_CREDENTIAL),
        }
    }
}

/// Host the client asked for: the URI authority when present (absolute-form and
/// CONNECT targets), otherwise the `Host` header. Userinfo is never part of it.
pub fn request_host<B>(req: &Request<B>) -> Option<String> {
    if let Some(authority) = req.uri().authority() {
        return Some(match authority.port() {
            Some(port) => format!("{}:{}", authority.host(), port.as_str()),
            None => authority.host().to_string(),
        });
    }

    req.headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .filter(|h| !h.is_empty())
        .map(|h| h.to_string())
}

fn header_value(s: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(s).map_err(|e| RelayError::Http(e.to_string()))
}
