//! Lease holder
//!
//! Acquires a named lease on the configured Redis, keeps it alive until
//! Ctrl+C or SIGTERM, then releases it.
//!
//! Usage: `layercache [LEASE_KEY]` (default key: `layercache:leader`)

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use layercache::{Config, FixedInterval, LockClient, RedisStore, RefreshPolicy};

const DEFAULT_LEASE_KEY: &str = "layercache:leader";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" for this crate, overridable with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "layercache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let key = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_LEASE_KEY.to_string());
    info!(
        "Configuration loaded: redis_url={}, lock_ttl={}ms, refresh_interval={}ms",
        config.redis_url, config.lock_ttl_ms, config.refresh_interval_ms
    );

    let store = RedisStore::connect(&config.redis_url)
        .await
        .with_context(|| format!("connecting to {}", config.redis_url))?;
    let client = LockClient::new(Arc::new(store));

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let retry = FixedInterval::new(config.lock_retry_interval(), config.lock_max_retries);
    let lock = client
        .lock(
            &key,
            config.lock_ttl(),
            config.lock_attempt_timeout(),
            retry,
            &shutdown,
        )
        .await
        .with_context(|| format!("acquiring lease {key}"))?;
    info!(key = %key, token = %lock.token(), "Holding lease");

    let policy = RefreshPolicy {
        interval: config.refresh_interval(),
        timeout: config.refresh_timeout(),
        max_consecutive_timeouts: config.refresh_max_timeouts,
    };
    let refresher = lock.clone();
    let mut refresh = tokio::spawn(async move { refresher.auto_refresh_with(policy).await });

    tokio::select! {
        _ = shutdown.cancelled() => {}
        outcome = &mut refresh => {
            match outcome {
                Ok(Err(err)) => error!(key = %key, error = %err, "Lease lost"),
                Ok(Ok(())) => {}
                Err(err) => error!(error = %err, "Refresh task panicked"),
            }
        }
    }

    match tokio::time::timeout(config.lock_attempt_timeout(), lock.unlock()).await {
        Ok(Ok(())) => info!(key = %key, "Lease released"),
        Ok(Err(err)) => warn!(key = %key, error = %err, "Lease was not released"),
        Err(_) => warn!(key = %key, "Timed out releasing lease"),
    }

    info!("Shutdown complete");
    Ok(())
}

/// Cancels `shutdown` on Ctrl+C or SIGTERM.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, releasing lease...");
        }
        _ = terminate => {
            info!("Received SIGTERM, releasing lease...");
        }
    }

    shutdown.cancel();
}
