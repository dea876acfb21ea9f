use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::{Config, SUBMIT_BASE_DELAY_MS, SUBMIT_MAX_DELAY_MS, SUBMIT_TIMEOUT_SECS};
use crate::engine::ports::UpdateSink;
use crate::error::{AppError, Result};

// ---------------------------------------------------------------------------
// Seller API sink
// ---------------------------------------------------------------------------

/// Pushes prices to the marketplace seller API.
/// Without credentials it runs dry: every submission is logged and reported as accepted.
pub struct SellerApiSink {
    client: reqwest::Client,
    seller_api_url: String,
    credentials: Option<(String, String)>,
}

impl SellerApiSink {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SUBMIT_TIMEOUT_SECS))
            .build()?;
        let credentials = match (&cfg.api_key, &cfg.seller_id) {
            (Some(key), Some(seller)) => Some((key.clone(), seller.clone())),
            _ => {
                warn!("TAKEALOT_API_KEY or TAKEALOT_SELLER_ID not set: price updates run in dry-run mode");
                None
            }
        };
        Ok(Self {
            client,
            seller_api_url: cfg.seller_api_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn is_dry_run(&self) -> bool {
        self.credentials.is_none()
    }
}

#[async_trait]
impl UpdateSink for SellerApiSink {
    async fn submit(&self, product_id: &str, new_price: i64) -> Result<()> {
        let Some((api_key, seller_id)) = &self.credentials else {
            info!(product_id, new_price, "[DRY RUN] would update price to R{new_price}");
            return Ok(());
        };

        let url = format!("{}/v2/offers/{}/price/", self.seller_api_url, product_id);
        let payload = serde_json::json!({
            "seller_id": numeric_or_string(seller_id),
            "offer_id": numeric_or_string(product_id),
            "selling_price": new_price,
        });

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Key {api_key}"))
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(AppError::Submit(format!("{status}: {body}")))
        }
    }
}

/// The seller API wants integer ids; keep the raw string if it isn't one.
fn numeric_or_string(id: &str) -> serde_json::Value {
    id.parse::<u64>()
        .map(serde_json::Value::from)
        .unwrap_or_else(|_| serde_json::Value::from(id))
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(SUBMIT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(SUBMIT_MAX_DELAY_MS),
        }
    }

    /// Delay after failed attempt `attempt` (1-based): base * 2^(attempt-1), capped,
    /// plus up to 20% jitter.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let base = self.base_delay.saturating_mul(1 << exp).min(self.max_delay);
        let jitter_range_ms = base.as_millis() as u64 / 5;
        let jitter = if jitter_range_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_range_ms)
        };
        base + Duration::from_millis(jitter)
    }
}

/// Submit with bounded retries. Never errors: a final failure is logged and
/// reported as `false`.
pub async fn submit_with_retry(
    sink: &dyn UpdateSink,
    product_id: &str,
    new_price: i64,
    policy: &RetryPolicy,
) -> bool {
    for attempt in 1..=policy.max_attempts {
        match sink.submit(product_id, new_price).await {
            Ok(()) => {
                info!(product_id, new_price, attempt, "Price updated to R{new_price}");
                return true;
            }
            Err(e) if attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    product_id,
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    "Price update failed, retrying: {e}"
                );
                sleep(delay).await;
            }
            Err(e) => {
                error!(
                    product_id,
                    new_price,
                    attempts = policy.max_attempts,
                    "Price update failed permanently: {e}"
                );
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    /// Fails the first `failures` calls.
    struct FlakySink {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakySink {
        fn new(failures: u32) -> Self {
            Self { failures, calls: AtomicU32::new(0) }
        }
    }

    #[async_trait]
    impl UpdateSink for FlakySink {
        async fn submit(&self, _product_id: &str, _new_price: i64) -> Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                Err(AppError::Submit("502 Bad Gateway".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let sink = FlakySink::new(2);
        let started = Instant::now();

        assert!(submit_with_retry(&sink, "1001", 649, &RetryPolicy::new(3)).await);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        // 500ms + 1000ms, before jitter
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let sink = FlakySink::new(u32::MAX);
        assert!(!submit_with_retry(&sink, "1001", 649, &RetryPolicy::new(3)).await);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_does_not_sleep() {
        let sink = FlakySink::new(0);
        let started = Instant::now();
        assert!(submit_with_retry(&sink, "1001", 649, &RetryPolicy::new(3)).await);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(3000),
        };
        let within = |d: Duration, base: u64| {
            d >= Duration::from_millis(base) && d <= Duration::from_millis(base + base / 5)
        };
        assert!(within(policy.delay_after(1), 500));
        assert!(within(policy.delay_after(2), 1000));
        assert!(within(policy.delay_after(3), 2000));
        assert!(within(policy.delay_after(4), 3000));
        assert!(within(policy.delay_after(30), 3000));
    }

    #[test]
    fn ids_are_sent_as_numbers_when_possible() {
        assert_eq!(numeric_or_string("1001"), serde_json::json!(1001));
        assert_eq!(numeric_or_string("PLID1"), serde_json::json!("PLID1"));
    }
}
