use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::config::Config;
use crate::engine::ports::PriceSource;
use crate::error::{AppError, Result};
use crate::types::Observation;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";

/// Live competitor lookup against the marketplace product endpoint.
///
/// The endpoint normally answers with product-details JSON carrying a `buybox`
/// object; when it serves an HTML product page instead, the first
/// `class="currency"` element is used.
pub struct MarketplacePriceSource {
    client: reqwest::Client,
    product_api_url: String,
    /// Our seller id, to recognise when the buybox is already ours.
    own_seller_id: Option<String>,
}

impl MarketplacePriceSource {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.fetch_timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            product_api_url: cfg.product_api_url.trim_end_matches('/').to_string(),
            own_seller_id: cfg.seller_id.clone(),
        })
    }
}

#[async_trait]
impl PriceSource for MarketplacePriceSource {
    async fn fetch(&self, product_id: &str) -> Result<Option<Observation>> {
        let url = format!("{}/{}", self.product_api_url, product_id);
        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            warn!(product_id, "Product page not found");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AppError::Fetch(format!("{url} returned {status}")));
        }

        let body = resp.text().await?;
        let obs = parse_product_body(&body, self.own_seller_id.as_deref());
        debug!(product_id, ?obs, "Parsed product response");
        Ok(obs)
    }
}

/// JSON first, HTML as a fallback.
pub fn parse_product_body(body: &str, own_seller_id: Option<&str>) -> Option<Observation> {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(v) => parse_product_json(&v, own_seller_id),
        Err(_) => parse_currency_span(body).map(Observation::Price),
    }
}

/// Read the buybox out of a product-details document.
pub fn parse_product_json(v: &serde_json::Value, own_seller_id: Option<&str>) -> Option<Observation> {
    let buybox = v.get("buybox")?;

    if let (Some(own), Some(holder)) = (own_seller_id, buybox_seller_id(buybox)) {
        if holder == own {
            return Some(Observation::OwnsBuybox);
        }
    }

    let price = buybox
        .get("prices")
        .and_then(|p| p.as_array())
        .and_then(|a| a.iter().find_map(number_or_string))
        .or_else(|| buybox.get("price").and_then(number_or_string))
        .or_else(|| buybox.get("pretty_price").and_then(number_or_string))?;

    (price.is_finite() && price > 0.0).then_some(Observation::Price(price))
}

fn buybox_seller_id(buybox: &serde_json::Value) -> Option<String> {
    let raw = buybox
        .get("seller_id")
        .or_else(|| buybox.get("seller").and_then(|s| s.get("seller_id")))?;
    match raw {
        serde_json::Value::String(s) => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_or_string(v: &serde_json::Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str().and_then(parse_currency_text))
}

/// First `class="currency"` element's text in an HTML product page.
pub fn parse_currency_span(html: &str) -> Option<f64> {
    let marker = html
        .find("class=\"currency")
        .or_else(|| html.find("class='currency"))?;
    let after_tag = &html[marker..];
    let start = after_tag.find('>')? + 1;
    let text = &after_tag[start..];
    let end = text.find('<').unwrap_or(text.len());
    parse_currency_text(&text[..end])
}

/// `R 1,299` → 1299.0
fn parse_currency_text(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('R')
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse::<f64>().ok().filter(|p| *p > 0.0)
}
