//! Proxy server implementation
//!
//! This module provides the proxy server functionality including:
//! - Request signing with the Sogou tag
//! - Backend probing and the host pool actor
//! - HTTP relaying and CONNECT tunnels

pub mod handler;
pub mod middleware;
pub mod pool;
pub mod probe;
pub mod server;
pub mod tag;
pub mod tunnel;

pub use handler::RelayHandler;
pub use pool::{HostPool, PoolConfig, PoolHandle};
pub use probe::{BackendProber, Dialer, TcpDialer};
pub use server::ProxyServer;
pub use tunnel::TunnelHandler;
