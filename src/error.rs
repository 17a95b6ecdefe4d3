use hyper::StatusCode;
use thiserror::Error;

/// Unified error type for the proxy
#[derive(Error, Debug)]
pub enum RelayError {
    // Pool errors
    #[error("Backend pool is not running")]
    PoolClosed,

    #[error("Backend index {index} is out of range (pool has {count} hosts)")]
    IndexOutOfRange { index: usize, count: usize },

    // Backend errors
    #[error("Backend dial failed: {0}")]
    DialFailed(String),

    #[error("Backend handshake failed: {0}")]
    BackendHandshake(String),

    #[error("Backend response error: {0}")]
    BackendResponse(String),

    #[error("Operation timed out")]
    Timeout,

    // Client-side errors
    #[error("Client connection does not support hijacking")]
    HijackUnsupported,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown proxy type '{0}'")]
    UnknownProxyType(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(String),
}

/// Result type alias for proxy operations
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Get the HTTP status code reported to the client for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,

            // 503 Service Unavailable
            RelayError::PoolClosed => StatusCode::SERVICE_UNAVAILABLE,

            // 504 Gateway Timeout
            RelayError::Timeout => StatusCode::GATEWAY_TIMEOUT,

            // 500 Internal Server Error
            RelayError::HijackUnsupported
            | RelayError::BackendHandshake(_)
            | RelayError::BackendResponse(_)
            | RelayError::DialFailed(_)
            | RelayError::IndexOutOfRange { .. }
            | RelayError::InvalidConfig(_)
            | RelayError::UnknownProxyType(_)
            | RelayError::Io(_)
            | RelayError::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

// Convert from hyper errors
impl From<hyper::Error> for RelayError {
    fn from(err: hyper::Error) -> Self {
        RelayError::Http(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_code_mapping() {
        assert_eq!(
            RelayError::InvalidRequest("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::HijackUnsupported.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            RelayError::BackendResponse("malformed".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            RelayError::PoolClosed.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(RelayError::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_error_client_server_helpers() {
        assert!(RelayError::InvalidRequest("bad".to_string()).is_client_error());
        assert!(!RelayError::InvalidRequest("bad".to_string()).is_server_error());

        assert!(RelayError::PoolClosed.is_server_error());
        assert!(!RelayError::PoolClosed.is_client_error());
    }

    #[test]
    fn test_error_messages() {
        let err = RelayError::IndexOutOfRange { index: 7, count: 4 };
        assert_eq!(
            err.to_string(),
            "Backend index 7 is out of range (pool has 4 hosts)"
        );
        assert_eq!(
            RelayError::UnknownProxyType("xyz".to_string()).to_string(),
            "Unknown proxy type 'xyz'"
        );
    }
}
