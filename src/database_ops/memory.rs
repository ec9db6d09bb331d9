//! In-process store for dry runs and tests. Same upsert rules as the SQL
//! backends, applied under one lock so each call is atomic.
use chrono::{DateTime, Utc};
use indexmap::map::Entry;
use indexmap::IndexMap;
use itertools::Itertools;
use tokio::sync::Mutex;

use crate::database_ops::store::{
    ListFilter, ProductStore, SessionLog, StoreStats, StoredProduct, UpsertOutcome,
};
use crate::error::StoreError;
use crate::model::{CanonicalRecord, Category};

#[derive(Default)]
struct State {
    products: IndexMap<String, StoredProduct>,
    sessions: Vec<SessionLog>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn counts_by<'a>(keys: impl Iterator<Item = &'a str>) -> IndexMap<String, i64> {
    keys.counts()
        .into_iter()
        .sorted_by(|(ka, na), (kb, nb)| nb.cmp(na).then_with(|| ka.cmp(kb)))
        .map(|(k, n)| (k.to_string(), n as i64))
        .collect()
}

#[async_trait::async_trait]
impl ProductStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn upsert(&self, record: &CanonicalRecord) -> Result<UpsertOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let mut slot = match state.products.entry(record.url.clone()) {
            Entry::Vacant(vacant) => {
                let mut fresh = record.clone();
                fresh.first_seen_at = record.scraped_at;
                vacant.insert(StoredProduct {
                    record: fresh,
                    times_seen: 1,
                });
                return Ok(UpsertOutcome::Inserted);
            }
            Entry::Occupied(occupied) => occupied,
        };

        let existing = slot.get_mut();
        if record.scraped_at < existing.record.scraped_at {
            return Ok(UpsertOutcome::Skipped);
        }
        let stored = &mut existing.record;
        stored.title = record.title.clone();
        stored.price_text = record.price_text.clone();
        stored.price_amount = record.price_amount;
        stored.currency = record.currency;
        stored.category = record.category;
        if record.brand.is_some() {
            stored.brand = record.brand.clone();
        }
        stored.description = record.description.clone();
        stored.scraped_at = record.scraped_at;
        existing.times_seen += 1;
        Ok(UpsertOutcome::Updated)
    }

    async fn get(&self, url: &str) -> Result<Option<StoredProduct>, StoreError> {
        Ok(self.state.lock().await.products.get(url).cloned())
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<StoredProduct>, StoreError> {
        let state = self.state.lock().await;
        let matching = state
            .products
            .values()
            .filter(|p| filter.category.map_or(true, |c| p.record.category == c))
            .filter(|p| {
                filter
                    .website
                    .as_deref()
                    .map_or(true, |w| p.record.source_website == w)
            })
            .sorted_by(|a, b| {
                b.record
                    .scraped_at
                    .cmp(&a.record.scraped_at)
                    .then_with(|| a.record.url.cmp(&b.record.url))
            })
            .cloned();
        Ok(match filter.limit {
            Some(n) => matching.take(n as usize).collect(),
            None => matching.collect(),
        })
    }

    async fn set_category(&self, url: &str, category: Category) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.products.get_mut(url) {
            Some(p) if p.record.category != category => {
                p.record.category = category;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let state = self.state.lock().await;
        let products = state.products.values();
        Ok(StoreStats {
            total_products: state.products.len() as i64,
            by_category: counts_by(products.clone().map(|p| p.record.category.label())),
            by_website: counts_by(products.clone().map(|p| p.record.source_website.as_str())),
            total_sessions: state.sessions.len() as i64,
            last_scraped_at: products.map(|p| p.record.scraped_at).max(),
        })
    }

    async fn log_session(&self, session: &SessionLog) -> Result<(), StoreError> {
        self.state.lock().await.sessions.push(session.clone());
        Ok(())
    }

    async fn recent_sessions(
        &self,
        website: Option<&str>,
        limit: u32,
    ) -> Result<Vec<SessionLog>, StoreError> {
        let state = self.state.lock().await;
        // insertion index breaks ties so later logs come first
        Ok(state
            .sessions
            .iter()
            .enumerate()
            .filter(|(_, s)| website.map_or(true, |w| s.website == w))
            .sorted_by(|(ia, a), (ib, b)| b.logged_at.cmp(&a.logged_at).then_with(|| ib.cmp(ia)))
            .take(limit as usize)
            .map(|(_, s)| s.clone())
            .collect())
    }

    async fn prune_sessions(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.sessions.len();
        state.sessions.retain(|s| s.logged_at >= older_than);
        Ok((before - state.sessions.len()) as u64)
    }
}
