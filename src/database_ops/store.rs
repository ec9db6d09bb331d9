//! Storage seam shared by the SQLite, Postgres and in-process backends.
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::database_ops::memory::MemoryStore;
use crate::database_ops::postgres::PgStore;
use crate::database_ops::sqlite::SqliteStore;
use crate::error::StoreError;
use crate::model::{CanonicalRecord, Category};

/// Result of one conditional upsert keyed by `url`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// The stored row is newer than the candidate; nothing was written.
    Skipped,
}

impl UpsertOutcome {
    /// `times_seen` returned by the upsert, or `None` when the guard rejected it.
    pub fn from_times_seen(times_seen: Option<i64>) -> Self {
        match times_seen {
            None => UpsertOutcome::Skipped,
            Some(n) if n <= 1 => UpsertOutcome::Inserted,
            Some(_) => UpsertOutcome::Updated,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Inserted => "inserted",
            UpsertOutcome::Updated => "updated",
            UpsertOutcome::Skipped => "skipped",
        }
    }
}

impl fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted product plus the sighting counter the store maintains.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredProduct {
    #[serde(flatten)]
    pub record: CanonicalRecord,
    pub times_seen: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub category: Option<Category>,
    pub website: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub total_products: i64,
    /// Largest bucket first.
    pub by_category: IndexMap<String, i64>,
    pub by_website: IndexMap<String, i64>,
    pub total_sessions: i64,
    pub last_scraped_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Success,
    Partial,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Success => "success",
            SessionStatus::Partial => "partial",
            SessionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown session status {0:?}")]
pub struct UnknownSessionStatus(pub String);

impl FromStr for SessionStatus {
    type Err = UnknownSessionStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(SessionStatus::Success),
            "partial" => Ok(SessionStatus::Partial),
            "failed" => Ok(SessionStatus::Failed),
            _ => Err(UnknownSessionStatus(s.to_string())),
        }
    }
}

/// One scrape run for one website.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionLog {
    pub website: String,
    pub status: SessionStatus,
    pub products_count: i64,
    pub notes: Option<String>,
    pub logged_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait ProductStore: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Single atomic insert-or-update keyed by `record.url`.
    ///
    /// Absent rows are inserted with `first_seen_at = scraped_at`. Present rows
    /// are updated only when the candidate is not older than the stored
    /// `scraped_at`; `first_seen_at` is never rewritten and a missing brand
    /// keeps the stored one.
    async fn upsert(&self, record: &CanonicalRecord) -> Result<UpsertOutcome, StoreError>;

    async fn get(&self, url: &str) -> Result<Option<StoredProduct>, StoreError>;

    /// Most recently scraped first.
    async fn list(&self, filter: &ListFilter) -> Result<Vec<StoredProduct>, StoreError>;

    /// Returns whether a row was changed.
    async fn set_category(&self, url: &str, category: Category) -> Result<bool, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;

    async fn log_session(&self, session: &SessionLog) -> Result<(), StoreError>;

    /// Newest first.
    async fn recent_sessions(
        &self,
        website: Option<&str>,
        limit: u32,
    ) -> Result<Vec<SessionLog>, StoreError>;

    /// Deletes sessions logged strictly before `older_than`; returns the count.
    async fn prune_sessions(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Open the store a database URL points at: `sqlite:`, `postgres://` /
/// `postgresql://`, or `memory://` for a throwaway in-process store.
pub async fn connect_store(
    database_url: &str,
    max_connections: u32,
) -> Result<Arc<dyn ProductStore>, StoreError> {
    let scheme = database_url
        .split(':')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match scheme.as_str() {
        "sqlite" => Ok(Arc::new(
            SqliteStore::connect(database_url, max_connections).await?,
        )),
        "postgres" | "postgresql" => Ok(Arc::new(
            PgStore::connect(database_url, max_connections).await?,
        )),
        "memory" => Ok(Arc::new(MemoryStore::new())),
        _ => Err(StoreError::UnsupportedUrl(scheme)),
    }
}

pub(crate) fn parse_category(url: &str, raw: &str) -> Result<Category, StoreError> {
    raw.parse().map_err(|e: crate::model::UnknownCategory| StoreError::Corrupt {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn parse_currency(url: &str, raw: &str) -> Result<crate::model::Currency, StoreError> {
    raw.parse().map_err(|e: crate::model::UnknownCurrency| StoreError::Corrupt {
        url: url.to_string(),
        reason: e.to_string(),
    })
}
