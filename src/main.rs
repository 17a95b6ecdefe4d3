//! Sogou Proxy - Entry Point
//!
//! Starts the host pool and the proxy server with graceful shutdown support.

use std::fs::File;
use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use sogou_proxy::config::{Config, LogConfig};
use sogou_proxy::error::Result;
use sogou_proxy::proxy::middleware::SogouAuth;
use sogou_proxy::proxy::{BackendProber, HostPool, PoolConfig, ProxyServer, RelayHandler, TcpDialer};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log)?;

    info!(
        "Sogou Proxy {} (type: {})",
        env!("CARGO_PKG_VERSION"),
        config.pool.kind
    );
    info!("This software is released under The MIT License.");

    let hosts = config.pool.kind.template();
    let prober = BackendProber::new(Arc::new(TcpDialer), hosts, config.pool.probe_timeout());

    // The pool probes every host in the background before serving selections
    let pool = HostPool::spawn(
        prober.clone(),
        PoolConfig {
            refresh_interval: config.pool.refresh_interval(),
            retry_backoff: config.pool.retry_backoff(),
            seed: None,
        },
    );

    let handler = RelayHandler::new(pool, prober, SogouAuth::default());
    let server = ProxyServer::new(config.proxy.clone(), handler);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut server_task = tokio::spawn(async move { server.run(shutdown_rx).await });

    tokio::select! {
        result = &mut server_task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Proxy server error: {}", e);
                    return Err(e);
                }
                Err(e) => error!("Proxy server task failed: {}", e),
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
            let _ = server_task.await;
        }
    }

    info!("Sogou Proxy stopped");
    Ok(())
}

/// Console and optional file logging, filtered by `RUST_LOG` or the configured level
fn init_tracing(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("sogou_proxy={}", config.level).into());

    let console = if config.quiet {
        None
    } else if config.format.eq_ignore_ascii_case("json") {
        Some(fmt::layer().json().with_writer(std::io::stderr).boxed())
    } else {
        Some(fmt::layer().with_writer(std::io::stderr).boxed())
    };

    let file = match &config.file {
        Some(path) => {
            let file = File::create(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
