use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode};
use sqlx::Row;
use tracing::{debug, info, instrument};

use crate::database_ops::store::{
    parse_category, parse_currency, ListFilter, ProductStore, SessionLog, StoreStats,
    StoredProduct, UnknownSessionStatus, UpsertOutcome,
};
use crate::error::StoreError;
use crate::model::{CanonicalRecord, Category};
use crate::util::env::env_flag;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations/postgres");

const UPSERT_SQL: &str = "\
INSERT INTO products (url, title, price_text, price_amount, currency, source_website, \
                      category, brand, description, scraped_at, first_seen_at, times_seen) \
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10, 1) \
ON CONFLICT (url) DO UPDATE SET \
    title = EXCLUDED.title, \
    price_text = EXCLUDED.price_text, \
    price_amount = EXCLUDED.price_amount, \
    currency = EXCLUDED.currency, \
    category = EXCLUDED.category, \
    brand = COALESCE(EXCLUDED.brand, products.brand), \
    description = EXCLUDED.description, \
    scraped_at = EXCLUDED.scraped_at, \
    times_seen = products.times_seen + 1 \
WHERE EXCLUDED.scraped_at >= products.scraped_at \
RETURNING times_seen";

const PRODUCT_COLUMNS: &str = "url, title, price_text, price_amount, currency, source_website, \
                               category, brand, description, scraped_at, first_seen_at, times_seen";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    // never put the DSN in a span, it may carry credentials
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let mut options = PgConnectOptions::from_str(database_url)?;
        if database_url.contains("sslmode=require") {
            options = options.ssl_mode(PgSslMode::Require);
        }
        if !env_flag("USE_PREPARED", false) {
            // PgBouncer transaction mode cannot hold prepared statements
            options = options.statement_cache_capacity(0);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(options)
            .await?;
        info!("connected to postgres");

        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn product_from_row(row: &PgRow) -> Result<StoredProduct, StoreError> {
    let url: String = row.try_get("url")?;
    let category: String = row.try_get("category")?;
    let currency: String = row.try_get("currency")?;

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
            scraped_at: row.try_get("scraped_at")?,
            first_seen_at: row.try_get("first_seen_at")?,
            url,
        },
        times_seen: row.try_get("times_seen")?,
    })
}

fn session_from_row(row: &PgRow) -> Result<SessionLog, StoreError> {
    let website: String = row.try_get("website")?;
    let status: String = row.try_get("status")?;
    Ok(SessionLog {
        status: status
            .parse()
            .map_err(|e: UnknownSessionStatus| StoreError::Corrupt {
                url: website.clone(),
                reason: e.to_string(),
            })?,
        products_count: row.try_get("products_count")?,
        notes: row.try_get("notes")?,
        logged_at: row.try_get("logged_at")?,
        website,
    })
}

async fn grouped_counts(pool: &PgPool, column: &str) -> Result<IndexMap<String, i64>, StoreError> {
    let sql = format!(
        "SELECT {column} AS bucket, COUNT(*) AS n FROM products GROUP BY {column} ORDER BY n DESC, {column}"
    );
    let rows = sqlx::query(&sql).persistent(false).fetch_all(pool).await?;
    let mut out = IndexMap::with_capacity(rows.len());
    for row in rows {
        out.insert(row.try_get::<String, _>("bucket")?, row.try_get::<i64, _>("n")?);
    }
    Ok(out)
}

#[async_trait::async_trait]
impl ProductStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    #[instrument(skip(self, record), fields(url = %record.url))]
    async fn upsert(&self, record: &CanonicalRecord) -> Result<UpsertOutcome, StoreError> {
        let times_seen: Option<i64> = sqlx::query_scalar(UPSERT_SQL)
            .persistent(false)
            .bind(&record.url)
            .bind(&record.title)
            .bind(&record.price_text)
            .bind(record.price_amount)
            .bind(record.currency.code())
            .bind(&record.source_website)
            .bind(record.category.label())
            .bind(record.brand.as_deref())
            .bind(&record.description)
            .bind(record.scraped_at)
            .fetch_optional(&self.pool)
            .await?;
        let outcome = UpsertOutcome::from_times_seen(times_seen);
        debug!(%outcome, "upsert");
        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn get(&self, url: &str) -> Result<Option<StoredProduct>, StoreError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE url = $1");
        let row = sqlx::query(&sql)
            .persistent(false)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn list(&self, filter: &ListFilter) -> Result<Vec<StoredProduct>, StoreError> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE ($1::text IS NULL OR category = $1) AND ($2::text IS NULL OR source_website = $2) \
             ORDER BY scraped_at DESC, url \
             LIMIT $3"
        );
        // LIMIT NULL is unbounded in Postgres
        let rows = sqlx::query(&sql)
            .persistent(false)
            .bind(filter.category.map(|c| c.label()))
            .bind(filter.website.as_deref())
            .bind(filter.limit.map(i64::from))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(product_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn set_category(&self, url: &str, category: Category) -> Result<bool, StoreError> {
        let res = sqlx::query("UPDATE products SET category = $2 WHERE url = $1 AND category <> $2")
            .persistent(false)
            .bind(url)
            .bind(category.label())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let total_products: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .persistent(false)
            .fetch_one(&self.pool)
            .await?;
        let total_sessions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scrape_sessions")
            .persistent(false)
            .fetch_one(&self.pool)
            .await?;
        let last_scraped_at: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(scraped_at) FROM products")
                .persistent(false)
                .fetch_one(&self.pool)
                .await?;
        Ok(StoreStats {
            total_products,
            by_category: grouped_counts(&self.pool, "category").await?,
            by_website: grouped_counts(&self.pool, "source_website").await?,
            total_sessions,
            last_scraped_at,
        })
    }

    #[instrument(skip(self, session), fields(website = %session.website))]
    async fn log_session(&self, session: &SessionLog) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO scrape_sessions (website, status, products_count, notes, logged_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .persistent(false)
        .bind(&session.website)
        .bind(session.status.as_str())
        .bind(session.products_count)
        .bind(session.notes.as_deref())
        .bind(session.logged_at)
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
             WHERE ($1::text IS NULL OR website = $1) \
             ORDER BY logged_at DESC, id DESC \
             LIMIT $2",
        )
        .persistent(false)
        .bind(website)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(session_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn prune_sessions(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM scrape_sessions WHERE logged_at < $1")
            .persistent(false)
            .bind(older_than)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}
