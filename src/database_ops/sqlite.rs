use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info, instrument};

use crate::database_ops::store::{
    parse_category, parse_currency, ListFilter, ProductStore, SessionLog, StoreStats,
    StoredProduct, UnknownSessionStatus, UpsertOutcome,
};
use crate::error::StoreError;
use crate::model::{CanonicalRecord, Category};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations/sqlite");

const UPSERT_SQL: &str = "\
INSERT INTO products (url, title, price_text, price_amount, currency, source_website, \
                      category, brand, description, scraped_at, first_seen_at, times_seen) \
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10, 1) \
ON CONFLICT(url) DO UPDATE SET \
    title = excluded.title, \
    price_text = excluded.price_text, \
    price_amount = excluded.price_amount, \
    currency = excluded.currency, \
    category = excluded.category, \
    brand = COALESCE(excluded.brand, products.brand), \
    description = excluded.description, \
    scraped_at = excluded.scraped_at, \
    times_seen = products.times_seen + 1 \
WHERE excluded.scraped_at >= products.scraped_at \
RETURNING times_seen";

const PRODUCT_COLUMNS: &str = "url, title, price_text, price_amount, currency, source_website, \
                               category, brand, description, scraped_at, first_seen_at, times_seen";

/// Fixed-width UTC text so string comparison in SQL is chronological.
pub(crate) fn ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(url: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            url: url.to_string(),
            reason: format!("bad timestamp {raw:?}: {e}"),
        })
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) and migrate. In-memory databases are pinned
    /// to one long-lived connection; a second connection would see an empty db.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = if is_in_memory(database_url) {
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(max_connections.max(1))
                .acquire_timeout(Duration::from_secs(10))
                .connect_with(options)
                .await?
        };
        info!("connected to sqlite");

        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:", 1).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn product_from_row(row: &SqliteRow) -> Result<StoredProduct, StoreError> {
    let url: String = row.try_get("url")?;
    let category: String = row.try_get("category")?;
    let currency: String = row.try_get("currency")?;
    let scraped_at: String = row.try_get("scraped_at")?;
    let first_seen_at: String = row.try_get("first_seen_at")?;

    Ok(StoredProduct {
        record: CanonicalRecord {
            title: row.try_get("title")?,
            price_text: row.try_get("price_text")?,
            price_amount: row.try_get("price_amount")?,
            currency: parse_currency(&url, &currency)?,
            source_website: row.try_get("source_website")?,
            category: parse_category(&url, &category)?,
            brand: row.try_get("brand")?,
            description: row.try_get("description")?,
            scraped_at: parse_ts(&url, &scraped_at)?,
            first_seen_at: parse_ts(&url, &first_seen_at)?,
            url,
        },
        times_seen: row.try_get("times_seen")?,
    })
}

fn session_from_row(row: &SqliteRow) -> Result<SessionLog, StoreError> {
    let website: String = row.try_get("website")?;
    let status: String = row.try_get("status")?;
    let logged_at: String = row.try_get("logged_at")?;
    Ok(SessionLog {
        status: status
            .parse()
            .map_err(|e: UnknownSessionStatus| StoreError::Corrupt {
                url: website.clone(),
                reason: e.to_string(),
            })?,
        products_count: row.try_get("products_count")?,
        notes: row.try_get("notes")?,
        logged_at: parse_ts(&website, &logged_at)?,
        website,
    })
}

async fn grouped_counts(pool: &SqlitePool, column: &str) -> Result<IndexMap<String, i64>, StoreError> {
    let sql = format!(
        "SELECT {column} AS bucket, COUNT(*) AS n FROM products GROUP BY {column} ORDER BY n DESC, {column}"
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    let mut out = IndexMap::with_capacity(rows.len());
    for row in rows {
        out.insert(row.try_get::<String, _>("bucket")?, row.try_get::<i64, _>("n")?);
    }
    Ok(out)
}

#[async_trait::async_trait]
impl ProductStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    #[instrument(skip(self, record), fields(url = %record.url))]
    async fn upsert(&self, record: &CanonicalRecord) -> Result<UpsertOutcome, StoreError> {
        let times_seen: Option<i64> = sqlx::query_scalar(UPSERT_SQL)
            .bind(&record.url)
            .bind(&record.title)
            .bind(&record.price_text)
            .bind(record.price_amount)
            .bind(record.currency.code())
            .bind(&record.source_website)
            .bind(record.category.label())
            .bind(record.brand.as_deref())
            .bind(&record.description)
            .bind(ts(record.scraped_at))
            .fetch_optional(&self.pool)
            .await?;
        let outcome = UpsertOutcome::from_times_seen(times_seen);
        debug!(%outcome, "upsert");
        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn get(&self, url: &str) -> Result<Option<StoredProduct>, StoreError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE url = ?1");
        let row = sqlx::query(&sql)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn list(&self, filter: &ListFilter) -> Result<Vec<StoredProduct>, StoreError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE (?1 IS NULL OR category = ?1) AND (?2 IS NULL OR source_website = ?2) \
             ORDER BY scraped_at DESC, url \
             LIMIT ?3"
        );
        // SQLite treats a negative LIMIT as unbounded
        let limit = filter.limit.map(i64::from).unwrap_or(-1);
        let rows = sqlx::query(&sql)
            .bind(filter.category.map(|c| c.label()))
            .bind(filter.website.as_deref())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(product_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn set_category(&self, url: &str, category: Category) -> Result<bool, StoreError> {
        let res = sqlx::query("UPDATE products SET category = ?2 WHERE url = ?1 AND category <> ?2")
            .bind(url)
            .bind(category.label())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let total_products: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        let total_sessions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scrape_sessions")
            .fetch_one(&self.pool)
            .await?;
        let last: Option<String> = sqlx::query_scalar("SELECT MAX(scraped_at) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(StoreStats {
            total_products,
            by_category: grouped_counts(&self.pool, "category").await?,
            by_website: grouped_counts(&self.pool, "source_website").await?,
            total_sessions,
            last_scraped_at: last.as_deref().map(|raw| parse_ts("products", raw)).transpose()?,
        })
    }

    #[instrument(skip(self, session), fields(website = %session.website))]
    async fn log_session(&self, session: &SessionLog) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO scrape_sessions (website, status, products_count, notes, logged_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&session.website)
        .bind(session.status.as_str())
        .bind(session.products_count)
        .bind(session.notes.as_deref())
        .bind(ts(session.logged_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn recent_sessions(
        &self,
        website: Option<&str>,
        limit: u32,
    ) -> Result<Vec<SessionLog>, StoreError> {
        let rows = sqlx::query(
            "SELECT website, status, products_count, notes, logged_at FROM scrape_sessions \
             WHERE (?1 IS NULL OR website = ?1) \
             ORDER BY logged_at DESC, id DESC \
             LIMIT ?2",
        )
        .bind(website)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(session_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn prune_sessions(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM scrape_sessions WHERE logged_at < ?1")
            .bind(ts(older_than))
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::store::SessionStatus;
    use crate::model::Currency;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    fn record(url: &str, scraped_at: DateTime<Utc>) -> CanonicalRecord {
        CanonicalRecord {
            url: url.to_string(),
            title: "Samsung Galaxy S24".into(),
            price_text: "439.000 JOD".into(),
            price_amount: Some(439.0),
            currency: Currency::Jod,
            source_website: "Leaders Center Jordan".into(),
            category: Category::MobilePhones,
            brand: Some("Samsung".into()),
            description: String::new(),
            scraped_at,
            first_seen_at: scraped_at,
        }
    }

    #[test]
    fn timestamps_are_fixed_width() {
        let a = ts(at(9));
        let b = ts(at(9) + ChronoDuration::microseconds(1));
        assert_eq!(a, "2026-03-01T09:00:00.000000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_preserves_first_seen() {
        let store = SqliteStore::in_memory().await.unwrap();
        let url = "https://leaders.jo/en/product/galaxy-s24/";

        assert_eq!(store.upsert(&record(url, at(9))).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(&record(url, at(9))).await.unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.upsert(&record(url, at(12))).await.unwrap(), UpsertOutcome::Updated);

        let stored = store.get(url).await.unwrap().unwrap();
        assert_eq!(stored.record.first_seen_at, at(9));
        assert_eq!(stored.record.scraped_at, at(12));
        assert_eq!(stored.times_seen, 3);
        assert_eq!(store.stats().await.unwrap().total_products, 1);
    }

    #[tokio::test]
    async fn stale_candidate_is_skipped() {
        let store = SqliteStore::in_memory().await.unwrap();
        let url = "https://smartbuy-me.com/products/s24";
        store.upsert(&record(url, at(12))).await.unwrap();

        let mut old = record(url, at(8));
        old.title = "Old title".into();
        assert_eq!(store.upsert(&old).await.unwrap(), UpsertOutcome::Skipped);

        let stored = store.get(url).await.unwrap().unwrap();
        assert_eq!(stored.record.title, "Samsung Galaxy S24");
        assert_eq!(stored.record.scraped_at, at(12));
        assert_eq!(stored.times_seen, 1);
    }

    #[tokio::test]
    async fn missing_brand_keeps_stored_brand() {
        let store = SqliteStore::in_memory().await.unwrap();
        let url = "https://smartbuy-me.com/products/s24";
        store.upsert(&record(url, at(9))).await.unwrap();

        let mut later = record(url, at(10));
        later.brand = None;
        later.category = Category::Accessories;
        store.upsert(&later).await.unwrap();

        let stored = store.get(url).await.unwrap().unwrap();
        assert_eq!(stored.record.brand.as_deref(), Some("Samsung"));
        assert_eq!(stored.record.category, Category::Accessories);
    }

    #[tokio::test]
    async fn list_filters_and_stats() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert(&record("https://leaders.jo/a", at(9))).await.unwrap();
        let mut tv = record("https://smartbuy-me.com/b", at(10));
        tv.category = Category::TvsMonitors;
        tv.source_website = "SmartBuy Jordan".into();
        store.upsert(&tv).await.unwrap();
        store.upsert(&record("https://leaders.jo/c", at(11))).await.unwrap();

        let phones = store
            .list(&ListFilter {
                category: Some(Category::MobilePhones),
                ..ListFilter::default()
            })
            .await
            .unwrap();
        let urls: Vec<&str> = phones.iter().map(|p| p.record.url.as_str()).collect();
        assert_eq!(urls, ["https://leaders.jo/c", "https://leaders.jo/a"]);

        let limited = store
            .list(&ListFilter {
                website: Some("SmartBuy Jordan".into()),
                limit: Some(5),
                ..ListFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_products, 3);
        assert_eq!(stats.by_category.get_index(0), Some((&"Mobile Phones".to_string(), &2)));
        assert_eq!(stats.by_website.get("SmartBuy Jordan"), Some(&1));
        assert_eq!(stats.last_scraped_at, Some(at(11)));
    }

    #[tokio::test]
    async fn set_category_reports_change() {
        let store = SqliteStore::in_memory().await.unwrap();
        let url = "https://leaders.jo/a";
        store.upsert(&record(url, at(9))).await.unwrap();

        assert!(store.set_category(url, Category::Wearables).await.unwrap());
        assert!(!store.set_category(url, Category::Wearables).await.unwrap());
        assert!(!store.set_category("https://leaders.jo/missing", Category::Gaming).await.unwrap());
        assert_eq!(
            store.get(url).await.unwrap().unwrap().record.category,
            Category::Wearables
        );
    }

    #[tokio::test]
    async fn sessions_are_logged_listed_and_pruned() {
        let store = SqliteStore::in_memory().await.unwrap();
        for (website, hour, status) in [
            ("Leaders Center Jordan", 1, SessionStatus::Success),
            ("SmartBuy Jordan", 2, SessionStatus::Partial),
            ("Leaders Center Jordan", 3, SessionStatus::Failed),
        ] {
            store
                .log_session(&SessionLog {
                    website: website.into(),
                    status,
                    products_count: 10,
                    notes: None,
                    logged_at: at(hour),
                })
                .await
                .unwrap();
        }

        let leaders = store.recent_sessions(Some("Leaders Center Jordan"), 10).await.unwrap();
        assert_eq!(leaders.len(), 2);
        assert_eq!(leaders[0].status, SessionStatus::Failed);
        assert_eq!(store.recent_sessions(None, 1).await.unwrap().len(), 1);

        assert_eq!(store.prune_sessions(at(2)).await.unwrap(), 1);
        assert_eq!(store.stats().await.unwrap().total_sessions, 2);
    }

    #[tokio::test]
    async fn unknown_session_status_is_reported_as_corrupt() {
        let store = SqliteStore::in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO scrape_sessions (website, status, products_count, notes, logged_at) \
             VALUES ('SmartBuy Jordan', 'crashed', 0, NULL, ?1)",
        )
        .bind(ts(at(4)))
        .execute(store.pool())
        .await
        .unwrap();

        match store.recent_sessions(None, 5).await {
            Err(StoreError::Corrupt { url, reason }) => {
                assert_eq!(url, "SmartBuy Jordan");
                assert!(reason.contains("crashed"), "{reason}");
            }
            other => panic!("expected corrupt row, got {other:?}"),
        }
    }
}
