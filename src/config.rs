use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, RelayError};
use crate::models::ProxyKind;

/// Log file written when `LOG_FILE` is a plain toggle
pub const DEFAULT_LOG_FILE: &str = "gosogouproxy.log";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Proxy server configuration
    pub proxy: ProxyServerConfig,
    /// Backend pool configuration
    pub pool: PoolSettings,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ProxyServerConfig {
    /// Port for the proxy server (default: 8008)
    pub port: u16,
    /// Host to bind to (default: 127.0.0.1)
    pub host: String,
}

#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Which Sogou network to use
    pub kind: ProxyKind,
    /// Dial/probe timeout in milliseconds
    pub probe_timeout_ms: u64,
    /// Background refresh interval in seconds
    pub refresh_secs: u64,
    /// Backoff after a probe round finds no host, in seconds
    pub retry_secs: u64,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
    /// Disable console output
    pub quiet: bool,
    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            proxy: ProxyServerConfig {
                port: get_env_or("PROXY_PORT", "8008").parse().map_err(|_| {
                    RelayError::InvalidConfig("PROXY_PORT must be a valid port number".into())
                })?,
                host: get_env_or("PROXY_HOST", "127.0.0.1"),
            },
            pool: PoolSettings {
                kind: ProxyKind::from_str(&get_env_or("SOGOU_PROXY_TYPE", "edu"))?,
                probe_timeout_ms: parse_positive("PROBE_TIMEOUT_MS", "200")?,
                refresh_secs: parse_positive("POOL_REFRESH_SECS", "1800")?,
                retry_secs: parse_positive("POOL_RETRY_SECS", "10")?,
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
                quiet: parse_bool("LOG_QUIET")?,
                file: parse_log_file(),
            },
        })
    }
}

impl ProxyServerConfig {
    /// Address the server binds to
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl PoolSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_secs)
    }
}

fn parse_positive(key: &str, default: &str) -> Result<u64> {
    match get_env_or(key, default).parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(RelayError::InvalidConfig(format!(
            "{} must be a positive integer",
            key
        ))),
    }
}

fn parse_bool(key: &str) -> Result<bool> {
    match get_env_or(key, "false").trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(RelayError::InvalidConfig(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

/// `LOG_FILE` is either a toggle (`1`/`true`) or a path
fn parse_log_file() -> Option<PathBuf> {
    let raw = env::var("LOG_FILE").unwrap_or_default();
    match raw.trim().to_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => None,
        "1" | "true" | "yes" | "on" => Some(PathBuf::from(DEFAULT_LOG_FILE)),
        _ => Some(PathBuf::from(raw.trim())),
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
