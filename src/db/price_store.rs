use async_trait::async_trait;
use tracing::warn;

use crate::db::models::CompetitorPriceRow;
use crate::engine::ports::PriceStore;
use crate::error::Result;
use crate::types::{CompetitorPriceRecord, Observation, SignalSource};

/// SQLite-backed competitor price store. One row per product, upserted.
#[derive(Clone)]
pub struct SqlitePriceStore {
    pool: sqlx::SqlitePool,
}

impl SqlitePriceStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PriceStore for SqlitePriceStore {
    async fn get(&self, product_id: &str) -> Result<Option<CompetitorPriceRecord>> {
        let row = sqlx::query_as::<_, CompetitorPriceRow>(
            r#"
            SELECT product_id, price, owns_buybox, observed_at, source
            FROM competitor_prices
            WHERE product_id = ?
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(row_to_record))
    }

    async fn put(&self, record: &CompetitorPriceRecord) -> Result<()> {
        let (price, owns_buybox) = match record.observation {
            Observation::Price(p) => (Some(p), 0i64),
            Observation::OwnsBuybox => (None, 1i64),
        };

        sqlx::query(
            r#"
            INSERT INTO competitor_prices (product_id, price, owns_buybox, observed_at, source)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(product_id) DO UPDATE SET
                price = excluded.price,
                owns_buybox = excluded.owns_buybox,
                observed_at = excluded.observed_at,
                source = excluded.source
            "#,
        )
        .bind(&record.product_id)
        .bind(price)
        .bind(owns_buybox)
        .bind(record.observed_at)
        .bind(record.source.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Rows that cannot be interpreted are treated as missing rather than guessed at.
fn row_to_record(row: CompetitorPriceRow) -> Option<CompetitorPriceRecord> {
    let observation = if row.owns_buybox != 0 {
        Observation::OwnsBuybox
    } else {
        Observation::Price(row.price?)
    };
    let Some(source) = SignalSource::parse(&row.source) else {
        warn!(product_id = %row.product_id, source = %row.source, "Unknown source on stored price row");
        return None;
    };
    Some(CompetitorPriceRecord {
        product_id: row.product_id,
        observation,
        observed_at: row.observed_at,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, obs: Observation, at: i64) -> CompetitorPriceRecord {
        CompetitorPriceRecord {
            product_id: id.to_string(),
            observation: obs,
            observed_at: at,
            source: SignalSource::LiveFetch,
        }
    }

    #[tokio::test]
    async fn missing_product_is_none() {
        let store = SqlitePriceStore::new(crate::db::connect_in_memory().await.unwrap());
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_replaces_whole_row() {
        let store = SqlitePriceStore::new(crate::db::connect_in_memory().await.unwrap());

        store.put(&record("1001", Observation::Price(650.0), 100)).await.unwrap();
        let mut second = record("1001", Observation::OwnsBuybox, 200);
        second.source = SignalSource::Monitored;
        store.put(&second).await.unwrap();

        assert_eq!(store.get("1001").await.unwrap(), Some(second.clone()));

        // Writing the same record again is harmless.
        store.put(&second).await.unwrap();
        assert_eq!(store.get("1001").await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn rows_are_keyed_by_product() {
        let store = SqlitePriceStore::new(crate::db::connect_in_memory().await.unwrap());
        store.put(&record("a", Observation::Price(1.0), 1)).await.unwrap();
        store.put(&record("b", Observation::Price(2.0), 2)).await.unwrap();

        assert_eq!(
            store.get("a").await.unwrap().map(|r| r.observation),
            Some(Observation::Price(1.0))
        );
        assert_eq!(
            store.get("b").await.unwrap().map(|r| r.observation),
            Some(Observation::Price(2.0))
        );
    }
}
