use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde_json::Value;
use tracing::{info, warn};

use crate::api::routes::ApiState;
use crate::error::{AppError, Result};
use crate::types::PriceChangeEvent;

/// Validates synchronously, then reprices in the background so the marketplace
/// gets its acknowledgement straight away. Only malformed input is rejected.
pub async fn price_change(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>)> {
    let payload: Value = serde_json::from_slice(&body)?;
    let event = match parse_event(&payload) {
        Ok(e) => e,
        Err(e) => {
            warn!(payload = %payload, "Rejected webhook: {e}");
            return Err(e);
        }
    };

    let now = crate::now_secs();
    state.engine.health().record_webhook(now.max(0) as u64);
    info!(
        product_id = %event.product_id,
        my_price = event.my_current_price,
        "Webhook received for {}: current price R{}",
        event.product_id,
        event.my_current_price,
    );

    let product_id = event.product_id.clone();
    let engine = state.engine.clone();
    tokio::spawn(async move {
        engine.process(event).await;
    });

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "received",
            "product_id": product_id,
            "timestamp": now,
        })),
    ))
}

/// Accepts either `{product_id|offer_id, my_current_price}` or the marketplace form
/// where the new selling price sits in `values_changed.selling_price.new_value`
/// (`values_changed` may be an object or a JSON-encoded string).
pub fn parse_event(v: &Value) -> Result<PriceChangeEvent> {
    let product_id = v
        .get("product_id")
        .or_else(|| v.get("offer_id"))
        .and_then(id_string)
        .ok_or_else(|| AppError::InvalidInput("missing product_id/offer_id".to_string()))?;

    let raw_price = match v.get("my_current_price") {
        Some(p) => p.clone(),
        None => selling_price_from_changes(v).ok_or_else(|| {
            AppError::InvalidInput("missing my_current_price or values_changed.selling_price".to_string())
        })?,
    };

    let my_current_price = numeric(&raw_price)
        .filter(|p| p.is_finite() && *p >= 0.0)
        .ok_or_else(|| AppError::InvalidInput(format!("price is not a valid number: {raw_price}")))?;

    Ok(PriceChangeEvent {
        product_id,
        my_current_price,
    })
}

fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if n.is_u64() || n.is_i64() => Some(n.to_string()),
        _ => None,
    }
}

fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn selling_price_from_changes(v: &Value) -> Option<Value> {
    let changes = match v.get("values_changed")? {
        Value::String(s) => serde_json::from_str::<Value>(s).ok()?,
        other => other.clone(),
    };
    changes.get("selling_price")?.get("new_value").cloned()
}
