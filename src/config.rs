use std::time::Duration;

use crate::error::{AppError, Result};

pub const PRODUCT_API_URL: &str = "https://api.takealot.com/rest/v-1-10-0/product-details";
pub const SELLER_API_URL: &str = "https://seller-api.takealot.com";

pub const SERVICE_NAME: &str = "Marketplace Repricer";

/// Stored competitor prices older than this are ignored (seconds).
pub const FRESHNESS_WINDOW_SECS: i64 = 3600;

/// Short-term cache TTL for this process's own live fetches (seconds).
pub const CACHE_TTL_SECS: u64 = 3600;

/// Minimum gap between two live fetches against the marketplace, across all products.
pub const MIN_REQUEST_INTERVAL_MS: u64 = 2500;

/// Upper bound of the random delay added on top of the minimum gap.
pub const REQUEST_JITTER_MS: u64 = 1000;

/// A live fetch that takes longer than this counts as failed (seconds).
pub const FETCH_TIMEOUT_SECS: u64 = 15;

/// HTTP client timeout for seller API calls (seconds).
pub const SUBMIT_TIMEOUT_SECS: u64 = 10;

/// Background re-fetch interval for all configured products (seconds).
pub const MONITOR_INTERVAL_SECS: u64 = 1800;

/// Price submission attempts before giving up.
pub const SUBMIT_MAX_ATTEMPTS: u32 = 3;

/// First retry delay; doubles per attempt.
pub const SUBMIT_BASE_DELAY_MS: u64 = 500;

/// Retry delay ceiling.
pub const SUBMIT_MAX_DELAY_MS: u64 = 8000;

/// Channel capacity for the reprice log writer.
pub const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// CSV with OfferID, SellingPrice, CostPrice columns (PRODUCTS_CONFIG_PATH)
    pub products_config_path: String,
    pub product_api_url: String,
    pub seller_api_url: String,
    /// Seller API key (TAKEALOT_API_KEY). Without it, updates are dry-run.
    pub api_key: Option<String>,
    /// Our seller id (TAKEALOT_SELLER_ID), also used to recognise our own buybox.
    pub seller_id: Option<String>,
    pub freshness_window_secs: i64,
    pub cache_ttl: Duration,
    pub min_request_interval: Duration,
    pub request_jitter: Duration,
    pub fetch_timeout: Duration,
    pub monitor_enabled: bool,
    pub monitor_interval: Duration,
    /// Write live-fetch results to the price store as well as the cache (PERSIST_LIVE_FETCHES)
    pub persist_live_fetches: bool,
    pub submit_max_attempts: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // PORT is what most hosting platforms inject; API_PORT wins when both are set.
        let port = std::env::var("API_PORT")
            .or_else(|_| std::env::var("PORT"))
            .unwrap_or_else(|_| "5000".to_string());

        let cfg = Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "repricer.db".to_string()),
            api_port: port
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            products_config_path: std::env::var("PRODUCTS_CONFIG_PATH")
                .unwrap_or_else(|_| "products_config.csv".to_string()),
            product_api_url: std::env::var("PRODUCT_API_URL")
                .unwrap_or_else(|_| PRODUCT_API_URL.to_string()),
            seller_api_url: std::env::var("SELLER_API_URL")
                .unwrap_or_else(|_| SELLER_API_URL.to_string()),
            api_key: non_empty_var("TAKEALOT_API_KEY"),
            seller_id: non_empty_var("TAKEALOT_SELLER_ID"),
            freshness_window_secs: parse_var("FRESHNESS_WINDOW_SECS", FRESHNESS_WINDOW_SECS)?,
            cache_ttl: Duration::from_secs(parse_var("CACHE_TTL_SECS", CACHE_TTL_SECS)?),
            min_request_interval: Duration::from_millis(parse_var(
                "MIN_REQUEST_INTERVAL_MS",
                MIN_REQUEST_INTERVAL_MS,
            )?),
            request_jitter: Duration::from_millis(parse_var("REQUEST_JITTER_MS", REQUEST_JITTER_MS)?),
            fetch_timeout: Duration::from_secs(parse_var("FETCH_TIMEOUT_SECS", FETCH_TIMEOUT_SECS)?),
            monitor_enabled: parse_var("MONITOR_ENABLED", true)?,
            monitor_interval: Duration::from_secs(parse_var(
                "MONITOR_INTERVAL_SECS",
                MONITOR_INTERVAL_SECS,
            )?),
            persist_live_fetches: parse_var("PERSIST_LIVE_FETCHES", true)?,
            submit_max_attempts: parse_var("SUBMIT_MAX_ATTEMPTS", SUBMIT_MAX_ATTEMPTS)?,
        };

        if cfg.freshness_window_secs <= 0 {
            return Err(AppError::Config("FRESHNESS_WINDOW_SECS must be positive".to_string()));
        }
        if cfg.submit_max_attempts == 0 {
            return Err(AppError::Config("SUBMIT_MAX_ATTEMPTS must be at least 1".to_string()));
        }
        if cfg.monitor_interval.is_zero() {
            return Err(AppError::Config("MONITOR_INTERVAL_SECS must be positive".to_string()));
        }

        Ok(cfg)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match non_empty_var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}
