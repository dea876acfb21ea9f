//! Database row types matching `migrations/`.
//! Used by sqlx for typed queries.

#[derive(Debug, sqlx::FromRow)]
pub struct CompetitorPriceRow {
    pub product_id: String,
    pub price: Option<f64>,
    pub owns_buybox: i64,
    pub observed_at: i64,
    pub source: String,
}

#[derive(Debug, sqlx::FromRow, serde::Serialize)]
pub struct RepriceLogRow {
    pub id: i64,
    pub product_id: String,
    pub my_price: f64,
    pub competitor: String,
    pub competitor_price: Option<f64>,
    pub signal_source: Option<String>,
    pub new_price: Option<i64>,
    pub rule: Option<String>,
    pub outcome: String,
    pub created_at: i64,
}
