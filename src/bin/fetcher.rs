//! batch-fetcher: worker entrypoint
//!
//! Overview
//! --------
//! Connects to Redis, then repeatedly drains batches from the configured list
//! and logs what it received. Useful as a smoke test for producers and as a
//! template for real consumers.
//!
//! Error Model
//! -----------
//! - Initialization failures are fatal.
//! - Fetch failures are logged; the loop backs off and continues.
//! - Ctrl-c cancels the in-flight fetch. Items popped by that fetch are lost.

use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use batch_fetcher::config::{load_config, Config};
use batch_fetcher::redis::{init_redis_pool, ping, pool, RedisListQueue};
use batch_fetcher::BatchFetcher;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().compact())
        .with(ErrorLayer::default())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    info!("fetcher starting");

    let config = load_config()?;

    init_redis_pool(&config.redis_url).await?;
    let pool = pool()?;
    ping(pool).await?;

    let mut fetcher: BatchFetcher<serde_json::Value, _> =
        BatchFetcher::new(RedisListQueue::new(pool.clone())).with_cap(config.batch_cap);
    if let Some(limit) = config.fetch_timeout() {
        fetcher = fetcher.with_deadline(limit);
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shutdown.cancel();
        }
    });

    run_loop(&fetcher, &cancel, &config).await;
    info!("fetcher stopped");
    Ok(())
}

async fn run_loop(
    fetcher: &BatchFetcher<serde_json::Value, RedisListQueue>,
    cancel: &CancellationToken,
    cfg: &Config,
) {
    let keys = [cfg.queue_key.clone()];
    let backoff = cfg.idle_backoff();

    while !cancel.is_cancelled() {
        match fetcher.fetch(cancel, &keys).await {
            Ok(batch) if batch.is_empty() => idle(cancel, backoff).await,
            Ok(batch) => {
                info!(key = %cfg.queue_key, count = batch.len(), "batch received");
            }
            Err(e) if e.is_cancelled() && cancel.is_cancelled() => break,
            Err(e) => {
                error!(err = %e, transient = e.is_transient(), "fetch failed");
                idle(cancel, backoff).await;
            }
        }
    }
}

async fn idle(cancel: &CancellationToken, backoff: Duration) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(backoff) => {}
    }
}
