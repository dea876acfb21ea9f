mod api;
mod config;
mod db;
mod engine;
mod error;
mod fetcher;
mod monitor;
mod policy;
mod state;
mod submitter;
mod types;

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::{Config, CHANNEL_CAPACITY};
use crate::db::{DbWriter, SqlitePriceStore};
use crate::engine::resolver::{PriceResolver, ResolverSettings};
use crate::engine::RepricingEngine;
use crate::error::Result;
use crate::fetcher::MarketplacePriceSource;
use crate::monitor::PriceMonitor;
use crate::policy::CsvPolicySource;
use crate::submitter::{RetryPolicy, SellerApiSink};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = db::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Collaborators ---
    let latency = Arc::new(LatencyStats::new());
    let health = Arc::new(HealthState::new());

    let resolver = PriceResolver::new(
        Arc::new(MarketplacePriceSource::new(&cfg)?),
        Arc::new(SqlitePriceStore::new(pool.clone())),
        Arc::clone(&latency),
        ResolverSettings {
            freshness_window_secs: cfg.freshness_window_secs,
            cache_ttl: cfg.cache_ttl,
            min_request_interval: cfg.min_request_interval,
            request_jitter: cfg.request_jitter,
            fetch_timeout: cfg.fetch_timeout,
            persist_live_fetches: cfg.persist_live_fetches,
        },
    );

    let sink = SellerApiSink::new(&cfg)?;
    let dry_run = sink.is_dry_run();

    // --- Reprice log writer ---
    let (log_tx, log_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let writer = DbWriter::new(pool.clone(), log_rx);
    tokio::spawn(async move { writer.run().await });

    let engine = Arc::new(
        RepricingEngine::new(
            Arc::new(CsvPolicySource::new(&cfg.products_config_path)),
            resolver,
            Arc::new(sink),
            RetryPolicy::new(cfg.submit_max_attempts),
            Arc::clone(&health),
        )
        .with_log(log_tx),
    );
    info!(
        products = engine.policies().len(),
        freshness_window_secs = cfg.freshness_window_secs,
        dry_run,
        "Repricing engine ready with {} products",
        engine.policies().len(),
    );

    // --- Background price monitor ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if cfg.monitor_enabled {
        let monitor = PriceMonitor::new(Arc::clone(&engine), cfg.monitor_interval);
        tokio::spawn(async move { monitor.run(shutdown_rx).await });
        info!("Price monitor running every {}s", cfg.monitor_interval.as_secs());
    } else {
        info!("Price monitor disabled (MONITOR_ENABLED=false)");
    }

    // --- HTTP API server ---
    let api_state = ApiState {
        engine,
        pool,
        latency,
        started_at: Instant::now(),
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {e}");
            }
            info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    Ok(())
}

/// Current unix time in seconds.
pub(crate) fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
