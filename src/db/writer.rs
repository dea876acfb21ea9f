use tokio::sync::mpsc;
use tracing::error;

use crate::db::models::RepriceLogRow;
use crate::error::Result;
use crate::types::{CompetitorSignal, RepriceLogEntry};

/// Receives completed reprice runs from the engine and persists them to SQLite.
/// Runs as a dedicated background task so webhook processing never waits on the log.
pub struct DbWriter {
    pool: sqlx::SqlitePool,
    log_rx: mpsc::Receiver<RepriceLogEntry>,
}

impl DbWriter {
    pub fn new(pool: sqlx::SqlitePool, log_rx: mpsc::Receiver<RepriceLogEntry>) -> Self {
        Self { pool, log_rx }
    }

    pub async fn run(mut self) {
        while let Some(entry) = self.log_rx.recv().await {
            if let Err(e) = write_entry(&self.pool, &entry).await {
                error!("DB write error: {e}");
            }
        }
    }
}

pub async fn write_entry(pool: &sqlx::SqlitePool, e: &RepriceLogEntry) -> Result<()> {
    let competitor = match e.signal {
        CompetitorSignal::Absent => "absent",
        CompetitorSignal::OwnsBuybox => "owns_buybox",
        CompetitorSignal::Price(_) => "price",
    };
    let signal_source = e.source.map(|s| s.as_str());
    let new_price = e.result.map(|r| r.new_price);
    let rule = e.result.map(|r| r.rule_applied.as_str());
    let outcome = e.outcome.to_string();

    sqlx::query(
        r#"
        INSERT INTO reprice_log (
            product_id, my_price, competitor, competitor_price, signal_source,
            new_price, rule, outcome, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&e.product_id)
    .bind(e.my_price)
    .bind(competitor)
    .bind(e.signal.price())
    .bind(signal_source)
    .bind(new_price)
    .bind(rule)
    .bind(outcome)
    .bind(e.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Most recent log rows, newest first, optionally for one product.
pub async fn recent_entries(
    pool: &sqlx::SqlitePool,
    product_id: Option<&str>,
    limit: i64,
) -> Result<Vec<RepriceLogRow>> {
    let rows = sqlx::query_as::<_, RepriceLogRow>(
        r#"
        SELECT id, product_id, my_price, competitor, competitor_price, signal_source,
               new_price, rule, outcome, created_at
        FROM reprice_log
        WHERE (?1 IS NULL OR product_id = ?1)
        ORDER BY created_at DESC, id DESC
        LIMIT ?2
        "#,
    )
    .bind(product_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PricingResult, RepriceOutcome, Rule, SignalSource};

    fn entry(product_id: &str, created_at: i64, outcome: RepriceOutcome) -> RepriceLogEntry {
        RepriceLogEntry {
            product_id: product_id.to_string(),
            my_price: 700.0,
            signal: CompetitorSignal::Price(650.0),
            source: Some(SignalSource::LiveFetch),
            result: Some(PricingResult {
                new_price: 649,
                changed: true,
                rule_applied: Rule::Undercut,
            }),
            outcome,
            created_at,
        }
    }

    #[tokio::test]
    async fn writer_persists_entries_in_order() {
        let pool = crate::db::connect_in_memory().await.unwrap();
        let (tx, rx) = mpsc::channel(8);
        let writer = tokio::spawn(DbWriter::new(pool.clone(), rx).run());

        tx.send(entry("1001", 10, RepriceOutcome::Updated)).await.unwrap();
        tx.send(entry("1002", 20, RepriceOutcome::SubmitFailed)).await.unwrap();
        drop(tx);
        writer.await.unwrap();

        let rows = recent_entries(&pool, None, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].product_id, "1002");
        assert_eq!(rows[0].outcome, "submit_failed");
        assert_eq!(rows[1].new_price, Some(649));
        assert_eq!(rows[1].rule.as_deref(), Some("UNDERCUT"));
        assert_eq!(rows[1].competitor_price, Some(650.0));
    }

    #[tokio::test]
    async fn recent_entries_filters_by_product() {
        let pool = crate::db::connect_in_memory().await.unwrap();
        write_entry(&pool, &entry("a", 1, RepriceOutcome::Updated)).await.unwrap();
        write_entry(&pool, &entry("b", 2, RepriceOutcome::Updated)).await.unwrap();

        let mut skipped = entry("a", 3, RepriceOutcome::SkippedNoPolicy);
        skipped.signal = CompetitorSignal::Absent;
        skipped.source = None;
        skipped.result = None;
        write_entry(&pool, &skipped).await.unwrap();

        let rows = recent_entries(&pool, Some("a"), 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].outcome, "skipped_no_policy");
        assert_eq!(rows[0].competitor, "absent");
        assert!(rows[0].new_price.is_none());
        assert!(rows[0].signal_source.is_none());
    }
}
