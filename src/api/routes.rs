use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::latency::LatencyStats;
use crate::api::webhook;
use crate::config::SERVICE_NAME;
use crate::db::models::RepriceLogRow;
use crate::db::writer::recent_entries;
use crate::engine::ports::PriceStore;
use crate::engine::RepricingEngine;
use crate::error::{AppError, Result};
use crate::types::{CompetitorPriceRecord, ProductPolicy};

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<RepricingEngine>,
    pub pool: sqlx::SqlitePool,
    pub latency: Arc<LatencyStats>,
    pub started_at: Instant,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(get_health))
        .route("/health", get(get_health))
        .route("/webhook/price-change", post(webhook::price_change))
        .route("/products", get(get_products))
        .route("/products/reload", post(reload_products))
        .route("/prices/:id", get(get_price))
        .route("/reprices/recent", get(get_recent_reprices))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RecentRepricesQuery {
    pub product_id: Option<String>,
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub products: usize,
    pub cached_prices: usize,
    pub webhooks_received: u64,
    pub reprices_completed: u64,
    pub updates_submitted: u64,
    pub submit_failures: u64,
    pub last_webhook_at: Option<u64>,
    pub last_monitor_cycle_at: Option<u64>,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct PriceResponse {
    pub record: CompetitorPriceRecord,
    pub fresh: bool,
    pub cached_price: Option<f64>,
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub samples: u64,
    pub failures: u64,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let health = state.engine.health();
    let non_zero = |v: u64| (v > 0).then_some(v);

    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        products: state.engine.policies().len(),
        cached_prices: state.engine.resolver().cache().len(),
        webhooks_received: health.webhooks_received(),
        reprices_completed: health.reprices_completed(),
        updates_submitted: health.updates_submitted(),
        submit_failures: health.submit_failures(),
        last_webhook_at: non_zero(health.last_webhook_at()),
        last_monitor_cycle_at: non_zero(health.last_monitor_cycle_at()),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

async fn get_products(State(state): State<ApiState>) -> Json<Vec<ProductPolicy>> {
    let mut products: Vec<ProductPolicy> =
        state.engine.policies().snapshot().values().cloned().collect();
    products.sort_by(|a, b| a.product_id.cmp(&b.product_id));
    Json(products)
}

async fn reload_products(State(state): State<ApiState>) -> Result<Json<serde_json::Value>> {
    let count = state.engine.reload_policies()?;
    Ok(Json(serde_json::json!({ "status": "reloaded", "products": count })))
}

async fn get_price(
    State(state): State<ApiState>,
    Path(product_id): Path<String>,
) -> Result<Json<PriceResponse>> {
    let resolver = state.engine.resolver();
    let record = resolver
        .store()
        .get(&product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no stored price for {product_id}")))?;

    Ok(Json(PriceResponse {
        fresh: record.is_fresh(crate::now_secs(), resolver.settings().freshness_window_secs),
        cached_price: resolver.cache().get(&product_id),
        record,
    }))
}

async fn get_recent_reprices(
    State(state): State<ApiState>,
    Query(params): Query<RecentRepricesQuery>,
) -> Result<Json<Vec<RepriceLogRow>>> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let rows = recent_entries(&state.pool, params.product_id.as_deref(), limit).await?;
    Ok(Json(rows))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    let (p50_ms, p95_ms, p99_ms) = state.latency.percentiles();
    Json(LatencyResponse {
        samples: state.latency.len(),
        failures: state.latency.failures(),
        p50_ms,
        p95_ms,
        p99_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::engine::resolver::tests::{MemoryStore, ScriptedSource, NOW};
    use crate::engine::tests::{engine_with, RecordingSink};
    use crate::types::{Observation, SignalSource};

    async fn app(store: Arc<MemoryStore>) -> (Router, Arc<RepricingEngine>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let engine = Arc::new(engine_with(
            Arc::new(ScriptedSource::always(Observation::Price(650.0), 1)),
            store,
            Arc::clone(&sink),
        ));
        let state = ApiState {
            engine: Arc::clone(&engine),
            pool: crate::db::connect_in_memory().await.unwrap(),
            latency: Arc::new(LatencyStats::new()),
            started_at: Instant::now(),
        };
        (router(state), engine, sink)
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn webhook_accepts_valid_event() {
        let (app, engine, sink) = app(Arc::new(MemoryStore::default())).await;
        let resp = app
            .oneshot(post_json("/webhook/price-change", r#"{"offer_id": 1001, "my_current_price": 700}"#))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["status"], "received");
        assert_eq!(body["product_id"], "1001");
        assert_eq!(engine.health().webhooks_received(), 1);

        // The pipeline runs after the acknowledgement.
        for _ in 0..100 {
            if engine.health().reprices_completed() > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(*sink.submitted.lock().unwrap(), vec![("1001".to_string(), 649)]);
        assert_eq!(engine.health().updates_submitted(), 1);
    }

    #[tokio::test]
    async fn webhook_rejects_invalid_input_without_side_effects() {
        let (app, engine, sink) = app(Arc::new(MemoryStore::default())).await;

        let resp = app
            .clone()
            .oneshot(post_json("/webhook/price-change", r#"{"my_current_price": 700}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .oneshot(post_json("/webhook/price-change", "not json"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        assert_eq!(engine.health().webhooks_received(), 0);
        assert_eq!(engine.health().reprices_completed(), 0);
        assert!(sink.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn price_lookup_reports_record_or_404() {
        let store = Arc::new(MemoryStore::with(CompetitorPriceRecord {
            product_id: "1001".to_string(),
            observation: Observation::Price(650.0),
            observed_at: NOW,
            source: SignalSource::Monitored,
        }));
        let (app, _, _) = app(store).await;

        let resp = app
            .clone()
            .oneshot(Request::get("/prices/1001").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["record"]["observation"]["price"], 650.0);
        assert_eq!(body["record"]["source"], "monitored");

        let resp = app
            .oneshot(Request::get("/prices/9999").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_and_products_list_policies() {
        let (app, _, _) = app(Arc::new(MemoryStore::default())).await;

        let resp = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["products"], 2);

        let resp = app
            .oneshot(Request::get("/products").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body[0]["product_id"], "1001");
        assert_eq!(body[0]["min_price"], 515);
        assert_eq!(body[1]["max_price"], 200);
    }

    #[tokio::test]
    async fn recent_reprices_empty_by_default() {
        let (app, _, _) = app(Arc::new(MemoryStore::default())).await;
        let resp = app
            .oneshot(Request::get("/reprices/recent?limit=5").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await, serde_json::json!([]));
    }
}
