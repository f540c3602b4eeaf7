//! Idempotent price persistence keyed on (commodity, market, observation date).
//!
//! Concurrent ingestion runs are safe because every write is an upsert on that
//! key, not because runs exclude each other.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use mandi_core::{CommodityTrend, PriceKey, PriceRecord, TrendLabel};
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Postgres caps a statement at 65535 bind parameters; each row binds 7.
pub const MAX_BATCH_SIZE: usize = 65_535 / 7;

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("stored row is invalid: {0}")]
    Corrupt(String),
    #[error("store call `{op}` timed out after {limit:?}")]
    Timeout { op: &'static str, limit: Duration },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub inserted: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
    /// Records dropped before writing because commodity or market was blank.
    pub filtered: usize,
    /// Records folded into a later record with the same key.
    pub duplicates: usize,
    pub batches: usize,
}

#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Upsert one batch. The whole batch succeeds or fails together.
    async fn upsert_prices(&self, batch: &[PriceRecord]) -> Result<BatchOutcome, StoreError>;

    async fn distinct_commodities(&self) -> Result<Vec<String>, StoreError>;

    /// Most recent observations first; same-date rows ordered by market name.
    async fn recent_prices(
        &self,
        commodity: &str,
        limit: usize,
    ) -> Result<Vec<PriceRecord>, StoreError>;

    async fn upsert_trends(&self, trends: &[CommodityTrend]) -> Result<(), StoreError>;

    async fn list_trends(&self) -> Result<Vec<CommodityTrend>, StoreError>;
}

/// Persist `records` in batches of `batch_size`, isolating failures per batch.
pub async fn upsert_price_records(
    store: &dyn PriceStore,
    records: Vec<PriceRecord>,
    batch_size: usize,
) -> UpsertSummary {
    let mut summary = UpsertSummary::default();

    let total = records.len();
    let valid: Vec<PriceRecord> = records.into_iter().filter(PriceRecord::has_identity).collect();
    summary.filtered = total - valid.len();

    let valid_count = valid.len();
    let records = collapse_duplicate_keys(valid);
    summary.duplicates = valid_count - records.len();

    if records.is_empty() {
        info!(filtered = summary.filtered, "no valid price records to upsert");
        return summary;
    }

    for (index, batch) in records.chunks(batch_size.clamp(1, MAX_BATCH_SIZE)).enumerate() {
        summary.batches += 1;
        match store.upsert_prices(batch).await {
            Ok(outcome) => {
                summary.inserted += outcome.inserted;
                summary.updated += outcome.updated;
            }
            Err(err) => {
                warn!(batch = index + 1, size = batch.len(), error = %err, "price batch failed");
                summary.failed += batch.len();
            }
        }
    }

    info!(
        inserted = summary.inserted,
        updated = summary.updated,
        failed = summary.failed,
        filtered = summary.filtered,
        duplicates = summary.duplicates,
        "price upsert finished"
    );
    summary
}

/// Keep one record per key, positioned at its first occurrence but carrying the last values.
fn collapse_duplicate_keys(records: Vec<PriceRecord>) -> Vec<PriceRecord> {
    let mut positions: HashMap<PriceKey, usize> = HashMap::with_capacity(records.len());
    let mut out: Vec<PriceRecord> = Vec::with_capacity(records.len());
    for record in records {
        match positions.get(&record.key()) {
            Some(&idx) => out[idx] = record,
            None => {
                positions.insert(record.key(), out.len());
                out.push(record);
            }
        }
    }
    debug!(kept = out.len(), "collapsed price keys");
    out
}

fn newest_first(a: &PriceRecord, b: &PriceRecord) -> std::cmp::Ordering {
    b.observation_date
        .cmp(&a.observation_date)
        .then_with(|| a.market.cmp(&b.market))
}

#[derive(Debug, Default)]
pub struct MemoryPriceStore {
    prices: RwLock<BTreeMap<PriceKey, PriceRecord>>,
    trends: RwLock<BTreeMap<String, CommodityTrend>>,
}

impl MemoryPriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn price_count(&self) -> usize {
        self.prices.read().await.len()
    }

    pub async fn get_price(&self, key: &PriceKey) -> Option<PriceRecord> {
        self.prices.read().await.get(key).cloned()
    }
}

#[async_trait]
impl PriceStore for MemoryPriceStore {
    async fn upsert_prices(&self, batch: &[PriceRecord]) -> Result<BatchOutcome, StoreError> {
        let mut prices = self.prices.write().await;
        let mut outcome = BatchOutcome::default();
        for record in batch {
            if prices.insert(record.key(), record.clone()).is_some() {
                outcome.updated += 1;
            } else {
                outcome.inserted += 1;
            }
        }
        Ok(outcome)
    }

    async fn distinct_commodities(&self) -> Result<Vec<String>, StoreError> {
        let prices = self.prices.read().await;
        let mut commodities: Vec<String> = prices.keys().map(|k| k.commodity.clone()).collect();
        commodities.dedup();
        Ok(commodities)
    }

    async fn recent_prices(
        &self,
        commodity: &str,
        limit: usize,
    ) -> Result<Vec<PriceRecord>, StoreError> {
        let prices = self.prices.read().await;
        let mut history: Vec<PriceRecord> = prices
            .values()
            .filter(|r| r.commodity == commodity)
            .cloned()
            .collect();
        history.sort_by(newest_first);
        history.truncate(limit);
        Ok(history)
    }

    async fn upsert_trends(&self, trends: &[CommodityTrend]) -> Result<(), StoreError> {
        let mut stored = self.trends.write().await;
        for trend in trends {
            stored.insert(trend.commodity.clone(), trend.clone());
        }
        Ok(())
    }

    async fn list_trends(&self) -> Result<Vec<CommodityTrend>, StoreError> {
        Ok(self.trends.read().await.values().cloned().collect())
    }
}

/// Puts a time limit on every call into the wrapped store.
pub struct TimeoutPriceStore {
    inner: Arc<dyn PriceStore>,
    limit: Duration,
}

impl TimeoutPriceStore {
    pub fn new(inner: Arc<dyn PriceStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, limit_secs = self.limit.as_secs_f64(), "store call timed out");
                Err(StoreError::Timeout {
                    op,
                    limit: self.limit,
                })
            }
        }
    }
}

#[async_trait]
impl PriceStore for TimeoutPriceStore {
    async fn upsert_prices(&self, batch: &[PriceRecord]) -> Result<BatchOutcome, StoreError> {
        self.bounded("upsert_prices", self.inner.upsert_prices(batch)).await
    }

    async fn distinct_commodities(&self) -> Result<Vec<String>, StoreError> {
        self.bounded("distinct_commodities", self.inner.distinct_commodities())
            .await
    }

    async fn recent_prices(
        &self,
        commodity: &str,
        limit: usize,
    ) -> Result<Vec<PriceRecord>, StoreError> {
        self.bounded("recent_prices", self.inner.recent_prices(commodity, limit))
            .await
    }

    async fn upsert_trends(&self, trends: &[CommodityTrend]) -> Result<(), StoreError> {
        self.bounded("upsert_trends", self.inner.upsert_trends(trends)).await
    }

    async fn list_trends(&self) -> Result<Vec<CommodityTrend>, StoreError> {
        self.bounded("list_trends", self.inner.list_trends()).await
    }
}

#[derive(Debug, Clone)]
pub struct PgPriceStore {
    pool: PgPool,
}

impl PgPriceStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn price_from_row(row: &PgRow) -> Result<PriceRecord, StoreError> {
    let observation_date: NaiveDate = row.try_get("observation_date")?;
    Ok(PriceRecord {
        commodity: row.try_get("commodity")?,
        state: row.try_get("state")?,
        district: row.try_get("district")?,
        market: row.try_get("market")?,
        modal_price: row.try_get("modal_price")?,
        arrival_volume: row.try_get("arrival_volume")?,
        observation_date,
    })
}

fn trend_from_row(row: &PgRow) -> Result<CommodityTrend, StoreError> {
    let label: String = row.try_get("trend_label")?;
    let trend_label: TrendLabel = label
        .parse()
        .map_err(|err| StoreError::Corrupt(format!("{err}")))?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
    Ok(CommodityTrend {
        commodity: row.try_get("commodity")?,
        current_price: row.try_get("current_price")?,
        percentage_change: row.try_get("percentage_change")?,
        trend_label,
        updated_at,
    })
}

#[async_trait]
impl PriceStore for PgPriceStore {
    async fn upsert_prices(&self, batch: &[PriceRecord]) -> Result<BatchOutcome, StoreError> {
        if batch.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let mut query = QueryBuilder::<Postgres>::new(
            "INSERT INTO price_observations \
             (commodity, state, district, market, modal_price, arrival_volume, observation_date) ",
        );
        query.push_values(batch, |mut b, record| {
            b.push_bind(record.commodity.as_str())
                .push_bind(record.state.as_str())
                .push_bind(record.district.as_str())
                .push_bind(record.market.as_str())
                .push_bind(record.modal_price)
                .push_bind(record.arrival_volume)
                .push_bind(record.observation_date);
        });
        query.push(
            " ON CONFLICT (commodity, market, observation_date) DO UPDATE SET \
             state = EXCLUDED.state, \
             district = EXCLUDED.district, \
             modal_price = EXCLUDED.modal_price, \
             arrival_volume = EXCLUDED.arrival_volume, \
             updated_at = NOW() \
             RETURNING (xmax = 0) AS inserted",
        );

        let rows = query.build().fetch_all(&self.pool).await?;
        let mut outcome = BatchOutcome::default();
        for row in rows {
            if row.try_get::<bool, _>("inserted")? {
                outcome.inserted += 1;
            } else {
                outcome.updated += 1;
            }
        }
        Ok(outcome)
    }

    async fn distinct_commodities(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT commodity
              FROM price_observations
             ORDER BY commodity
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| row.try_get("commodity").map_err(StoreError::from))
            .collect()
    }

    async fn recent_prices(
        &self,
        commodity: &str,
        limit: usize,
    ) -> Result<Vec<PriceRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT commodity, state, district, market, modal_price, arrival_volume, observation_date
              FROM price_observations
             WHERE commodity = $1
             ORDER BY observation_date DESC, market ASC
             LIMIT $2
            "#,
        )
        .bind(commodity)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(price_from_row).collect()
    }

    async fn upsert_trends(&self, trends: &[CommodityTrend]) -> Result<(), StoreError> {
        if trends.is_empty() {
            return Ok(());
        }

        let mut query = QueryBuilder::<Postgres>::new(
            "INSERT INTO commodity_trends \
             (commodity, current_price, percentage_change, trend_label, updated_at) ",
        );
        query.push_values(trends, |mut b, trend| {
            b.push_bind(trend.commodity.as_str())
                .push_bind(trend.current_price)
                .push_bind(trend.percentage_change)
                .push_bind(trend.trend_label.as_str())
                .push_bind(trend.updated_at);
        });
        query.push(
            " ON CONFLICT (commodity) DO UPDATE SET \
             current_price = EXCLUDED.current_price, \
             percentage_change = EXCLUDED.percentage_change, \
             trend_label = EXCLUDED.trend_label, \
             updated_at = EXCLUDED.updated_at",
        );
        query.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn list_trends(&self) -> Result<Vec<CommodityTrend>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT commodity, current_price, percentage_change, trend_label, updated_at
              FROM commodity_trends
             ORDER BY commodity
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(trend_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(commodity: &str, market: &str, day: u32, price: f64) -> PriceRecord {
        PriceRecord {
            commodity: commodity.to_string(),
            state: "Maharashtra".to_string(),
            district: "Nashik".to_string(),
            market: market.to_string(),
            modal_price: price,
            arrival_volume: Some(12.5),
            observation_date: NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
        }
    }

    /// Fails every batch whose 1-based position is listed.
    struct FlakyStore {
        inner: MemoryPriceStore,
        calls: AtomicUsize,
        failing_batches: Vec<usize>,
    }

    #[async_trait]
    impl PriceStore for FlakyStore {
        async fn upsert_prices(&self, batch: &[PriceRecord]) -> Result<BatchOutcome, StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing_batches.contains(&call) {
                return Err(StoreError::Corrupt(format!("batch {call} rejected")));
            }
            self.inner.upsert_prices(batch).await
        }

        async fn distinct_commodities(&self) -> Result<Vec<String>, StoreError> {
            self.inner.distinct_commodities().await
        }

        async fn recent_prices(
            &self,
            commodity: &str,
            limit: usize,
        ) -> Result<Vec<PriceRecord>, StoreError> {
            self.inner.recent_prices(commodity, limit).await
        }

        async fn upsert_trends(&self, trends: &[CommodityTrend]) -> Result<(), StoreError> {
            self.inner.upsert_trends(trends).await
        }

        async fn list_trends(&self) -> Result<Vec<CommodityTrend>, StoreError> {
            self.inner.list_trends().await
        }
    }

    #[tokio::test]
    async fn second_ingestion_overwrites_instead_of_duplicating() {
        let store = MemoryPriceStore::new();
        let first = upsert_price_records(
            &store,
            vec![record("Onion", "Lasalgaon", 2, 1800.0), record("Onion", "Pimpalgaon", 2, 1750.0)],
            DEFAULT_BATCH_SIZE,
        )
        .await;
        assert_eq!(first.inserted, 2);
        assert_eq!(first.updated, 0);

        let second = upsert_price_records(
            &store,
            vec![record("Onion", "Lasalgaon", 2, 1900.0)],
            DEFAULT_BATCH_SIZE,
        )
        .await;
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, 1);

        assert_eq!(store.price_count().await, 2);
        let stored = store
            .get_price(&record("Onion", "Lasalgaon", 2, 0.0).key())
            .await
            .expect("stored");
        assert_eq!(stored.modal_price, 1900.0);
    }

    #[tokio::test]
    async fn records_without_identity_are_filtered_not_failed() {
        let store = MemoryPriceStore::new();
        let summary = upsert_price_records(
            &store,
            vec![
                record("", "Lasalgaon", 2, 1800.0),
                record("Onion", "", 2, 1800.0),
                record("Onion", "Lasalgaon", 2, 1800.0),
            ],
            DEFAULT_BATCH_SIZE,
        )
        .await;
        assert_eq!(summary.filtered, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.inserted, 1);
    }

    #[tokio::test]
    async fn duplicate_keys_in_one_input_keep_the_last_values() {
        let store = MemoryPriceStore::new();
        let summary = upsert_price_records(
            &store,
            vec![
                record("Onion", "Lasalgaon", 2, 1800.0),
                record("Wheat", "Lasalgaon", 2, 2400.0),
                record("Onion", "Lasalgaon", 2, 1850.0),
            ],
            DEFAULT_BATCH_SIZE,
        )
        .await;
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.inserted, 2);
        let stored = store
            .get_price(&record("Onion", "Lasalgaon", 2, 0.0).key())
            .await
            .expect("stored");
        assert_eq!(stored.modal_price, 1850.0);
    }

    #[tokio::test]
    async fn failed_batch_is_counted_and_later_batches_still_run() {
        let store = FlakyStore {
            inner: MemoryPriceStore::new(),
            calls: AtomicUsize::new(0),
            failing_batches: vec![2],
        };
        let records = (1..=5)
            .map(|day| record("Onion", "Lasalgaon", day, 1000.0 + f64::from(day)))
            .collect();

        let summary = upsert_price_records(&store, records, 2).await;

        assert_eq!(summary.batches, 3);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.inserted, 3);
        assert_eq!(store.inner.price_count().await, 3);
    }

    /// Accepts every call and never answers.
    struct HangingStore;

    #[async_trait]
    impl PriceStore for HangingStore {
        async fn upsert_prices(&self, _batch: &[PriceRecord]) -> Result<BatchOutcome, StoreError> {
            std::future::pending().await
        }

        async fn distinct_commodities(&self) -> Result<Vec<String>, StoreError> {
            std::future::pending().await
        }

        async fn recent_prices(&self, _c: &str, _l: usize) -> Result<Vec<PriceRecord>, StoreError> {
            std::future::pending().await
        }

        async fn upsert_trends(&self, _trends: &[CommodityTrend]) -> Result<(), StoreError> {
            std::future::pending().await
        }

        async fn list_trends(&self) -> Result<Vec<CommodityTrend>, StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_batches_time_out_and_count_as_failed() {
        let store = TimeoutPriceStore::new(Arc::new(HangingStore), Duration::from_secs(5));
        let records = (1..=3)
            .map(|day| record("Onion", "Lasalgaon", day, 1000.0))
            .collect();

        let summary = tokio::time::timeout(
            Duration::from_secs(3600),
            upsert_price_records(&store, records, 2),
        )
        .await
        .expect("upsert finishes once every batch times out");

        assert_eq!(summary.batches, 2);
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.inserted, 0);

        let err = store.upsert_trends(&[]).await.expect_err("trend write times out");
        assert!(matches!(err, StoreError::Timeout { op: "upsert_trends", .. }));
    }

    #[tokio::test]
    async fn bounded_store_passes_results_through() {
        let inner = Arc::new(MemoryPriceStore::new());
        let store = TimeoutPriceStore::new(inner.clone(), DEFAULT_STORE_TIMEOUT);
        let summary = upsert_price_records(
            &store,
            vec![record("Onion", "Lasalgaon", 2, 1800.0)],
            DEFAULT_BATCH_SIZE,
        )
        .await;
        assert_eq!(summary.inserted, 1);
        assert_eq!(inner.price_count().await, 1);
        assert_eq!(store.distinct_commodities().await.unwrap(), vec!["Onion".to_string()]);
    }

    #[tokio::test]
    async fn oversized_batches_are_capped_to_the_bind_limit() {
        let store = MemoryPriceStore::new();
        let records: Vec<PriceRecord> = (0..MAX_BATCH_SIZE + 10)
            .map(|i| record("Onion", &format!("market-{i}"), 2, 1800.0))
            .collect();

        let summary = upsert_price_records(&store, records, 50_000).await;

        assert_eq!(summary.batches, 2);
        assert_eq!(summary.inserted, MAX_BATCH_SIZE + 10);
    }

    #[tokio::test]
    async fn recent_prices_are_newest_first_with_market_tie_break() {
        let store = MemoryPriceStore::new();
        store
            .upsert_prices(&[
                record("Onion", "B-market", 5, 200.0),
                record("Onion", "A-market", 4, 80.0),
                record("Onion", "A-market", 5, 100.0),
                record("Wheat", "A-market", 6, 2400.0),
            ])
            .await
            .unwrap();

        let history = store.recent_prices("Onion", 20).await.unwrap();
        let seen: Vec<(u32, &str)> = history
            .iter()
            .map(|r| (chrono::Datelike::day(&r.observation_date), r.market.as_str()))
            .collect();
        assert_eq!(seen, vec![(5, "A-market"), (5, "B-market"), (4, "A-market")]);

        let limited = store.recent_prices("Onion", 1).await.unwrap();
        assert_eq!(limited.len(), 1);

        let commodities = store.distinct_commodities().await.unwrap();
        assert_eq!(commodities, vec!["Onion".to_string(), "Wheat".to_string()]);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn postgres_upserts_and_reads_back() {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return;
        };
        let store = PgPriceStore::connect(&url).await.unwrap();
        store.migrate().await.unwrap();
        let commodity = format!("Onion-{}", uuid::Uuid::new_v4());
        let batch = vec![
            record(&commodity, "B-market", 5, 200.0),
            record(&commodity, "A-market", 4, 80.0),
            record(&commodity, "A-market", 5, 100.0),
        ];

        let first = store.upsert_prices(&batch).await.unwrap();
        assert_eq!(first, BatchOutcome { inserted: 3, updated: 0 });
        let second = store.upsert_prices(&batch).await.unwrap();
        assert_eq!(second, BatchOutcome { inserted: 0, updated: 3 });

        let history = store.recent_prices(&commodity, 20).await.unwrap();
        let seen: Vec<(u32, &str)> = history
            .iter()
            .map(|r| (chrono::Datelike::day(&r.observation_date), r.market.as_str()))
            .collect();
        assert_eq!(seen, vec![(5, "A-market"), (5, "B-market"), (4, "A-market")]);
        assert!(store.distinct_commodities().await.unwrap().contains(&commodity));

        let trend = CommodityTrend {
            commodity: commodity.clone(),
            current_price: 100.0,
            percentage_change: 25.0,
            trend_label: TrendLabel::Rising,
            updated_at: Utc::now(),
        };
        store.upsert_trends(&[trend.clone()]).await.unwrap();
        store.upsert_trends(&[trend]).await.unwrap();
        let stored: Vec<_> = store
            .list_trends()
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.commodity == commodity)
            .collect();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].trend_label, TrendLabel::Rising);
        assert_eq!(stored[0].percentage_change, 25.0);

        sqlx::query("DELETE FROM price_observations WHERE commodity = $1")
            .bind(&commodity)
            .execute(&store.pool)
            .await
            .unwrap();
        sqlx::query("DELETE FROM commodity_trends WHERE commodity = $1")
            .bind(&commodity)
            .execute(&store.pool)
            .await
            .unwrap();
    }
}
