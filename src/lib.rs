//! Sogou Proxy
//!
//! A local forward proxy for the Sogou edu-network mirror hosts.
//!
//! ## Features
//!
//! - Signs every request with the Sogou timestamp/tag/auth headers
//! - Picks a random reachable mirror host per request and skips hosts that fail to dial
//! - Re-probes all mirror hosts periodically, and immediately when none is reachable
//! - HTTP relaying and CONNECT tunnels for HTTPS

pub mod config;
pub mod error;
pub mod models;
pub mod proxy;

pub use config::Config;
pub use error::{RelayError, Result};
