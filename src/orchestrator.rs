//! Batch runner: raw records in, persisted canonical records out.
//!
//! Each record is normalized, classified and admitted in discovery order. A
//! failure on one record is counted and logged; the batch keeps going.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::classification::{CategoryClassifier, MatchStage};
use crate::database_ops::ingest_gate::IngestionGate;
use crate::database_ops::store::{
    ListFilter, ProductStore, SessionLog, SessionStatus, UpsertOutcome,
};
use crate::error::{IngestError, StoreError};
use crate::model::{CanonicalRecord, Category, RawRecord};
use crate::normalization::FieldNormalizer;
use crate::taxonomy::Taxonomy;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stamp every record with this time instead of the wall clock (replays).
    pub scraped_at: Option<DateTime<Utc>>,
    /// Write one scrape-session row per source website when the run ends.
    pub log_sessions: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WebsiteTally {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl WebsiteTally {
    pub fn stored(&self) -> usize {
        self.inserted + self.updated + self.skipped
    }

    pub fn status(&self) -> SessionStatus {
        match (self.stored(), self.failed) {
            (_, 0) => SessionStatus::Success,
            (0, _) => SessionStatus::Failed,
            _ => SessionStatus::Partial,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Malformed input, dropped before classification.
    pub rejected: usize,
    /// Storage failures.
    pub failed: usize,
    pub by_category: IndexMap<Category, usize>,
    pub by_website: IndexMap<String, WebsiteTally>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            inserted: 0,
            updated: 0,
            skipped: 0,
            rejected: 0,
            failed: 0,
            by_category: IndexMap::new(),
            by_website: IndexMap::new(),
        }
    }

    pub fn processed(&self) -> usize {
        self.inserted + self.updated + self.skipped + self.rejected + self.failed
    }

    fn record_stored(&mut self, record: &CanonicalRecord, outcome: UpsertOutcome) {
        let tally = self
            .by_website
            .entry(record.source_website.clone())
            .or_default();
        match outcome {
            UpsertOutcome::Inserted => {
                self.inserted += 1;
                tally.inserted += 1;
            }
            UpsertOutcome::Updated => {
                self.updated += 1;
                tally.updated += 1;
            }
            UpsertOutcome::Skipped => {
                self.skipped += 1;
                tally.skipped += 1;
            }
        }
        *self.by_category.entry(record.category).or_default() += 1;
    }

    fn record_failed(&mut self, website: &str) {
        self.failed += 1;
        self.by_website.entry(website.to_string()).or_default().failed += 1;
    }

    pub fn log_summary(&self) {
        info!(
            run_id = %self.run_id,
            processed = self.processed(),
            inserted = self.inserted,
            updated = self.updated,
            skipped = self.skipped,
            rejected = self.rejected,
            failed = self.failed,
            "ingest run summary"
        );
        for (category, count) in &self.by_category {
            debug!(run_id = %self.run_id, category = %category, count, "category distribution");
        }
        for (website, tally) in &self.by_website {
            debug!(
                run_id = %self.run_id,
                website = %website,
                stored = tally.stored(),
                failed = tally.failed,
                "website distribution"
            );
        }
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryChange {
    pub url: String,
    pub title: String,
    pub from: Category,
    pub to: Category,
    pub stage: MatchStage,
    pub matched: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecategorizeReport {
    pub examined: usize,
    pub unchanged: usize,
    /// Records the current tables can only place in the fallback category.
    /// Their stored category is kept: it may have come from a listing hint.
    pub fallback: usize,
    pub changes: Vec<CategoryChange>,
    pub applied: usize,
}

#[derive(Clone)]
pub struct Pipeline {
    normalizer: FieldNormalizer,
    classifier: CategoryClassifier,
    gate: IngestionGate,
}

impl Pipeline {
    pub fn new(taxonomy: Arc<Taxonomy>, store: Arc<dyn ProductStore>) -> Self {
        Self {
            normalizer: FieldNormalizer::new(taxonomy.clone()),
            classifier: CategoryClassifier::new(taxonomy),
            gate: IngestionGate::new(store),
        }
    }

    pub fn classifier(&self) -> &CategoryClassifier {
        &self.classifier
    }

    pub fn store(&self) -> &Arc<dyn ProductStore> {
        self.gate.store()
    }

    /// Normalize and classify without touching storage.
    pub fn prepare(
        &self,
        raw: &RawRecord,
        scraped_at: DateTime<Utc>,
    ) -> Result<CanonicalRecord, IngestError> {
        let fields = self.normalizer.normalize(raw)?;
        let category = self.classifier.classify(
            &fields.title,
            &fields.url,
            raw.category_hint.as_deref(),
            fields.brand.as_deref(),
        );
        Ok(fields.into_record(category, scraped_at))
    }

    /// Process records in order. Only malformed input and storage failures are
    /// counted against the run; neither stops it.
    #[instrument(skip(self, records, opts))]
    pub async fn run<I>(&self, records: I, opts: &RunOptions) -> RunSummary
    where
        I: IntoIterator<Item = Result<RawRecord, IngestError>>,
    {
        let mut summary = RunSummary::new();
        info!(run_id = %summary.run_id, "ingest run started");

        for item in records {
            let candidate = item.and_then(|raw| {
                self.prepare(&raw, opts.scraped_at.unwrap_or_else(Utc::now))
            });
            let candidate = match candidate {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "record rejected");
                    summary.rejected += 1;
                    continue;
                }
            };

            match self.gate.admit(&candidate).await {
                Ok(outcome) => {
                    debug!(
                        url = %candidate.url,
                        category = %candidate.category,
                        website = %candidate.source_website,
                        %outcome,
                        "record stored"
                    );
                    summary.record_stored(&candidate, outcome);
                }
                Err(e) => {
                    warn!(url = %candidate.url, error = %e, "record not stored");
                    summary.record_failed(&candidate.source_website);
                }
            }
        }

        if opts.log_sessions {
            self.log_sessions(&summary).await;
        }
        summary.log_summary();
        summary
    }

    async fn log_sessions(&self, summary: &RunSummary) {
        for (website, tally) in &summary.by_website {
            let session = SessionLog {
                website: website.clone(),
                status: tally.status(),
                products_count: tally.stored() as i64,
                notes: Some(format!(
                    "run {}: {} inserted, {} updated, {} skipped, {} failed",
                    summary.run_id, tally.inserted, tally.updated, tally.skipped, tally.failed
                )),
                logged_at: Utc::now(),
            };
            if let Err(e) = self.store().log_session(&session).await {
                warn!(website = %website, error = %e, "failed to log scrape session");
            }
        }
    }

    /// Re-run the classifier over stored records. With `apply`, changed
    /// categories are written back; otherwise the report is a dry run. A
    /// specific stored category is never replaced by the fallback.
    #[instrument(skip(self))]
    pub async fn recategorize(&self, apply: bool) -> Result<RecategorizeReport, StoreError> {
        let products = self.store().list(&ListFilter::default()).await?;
        let mut report = RecategorizeReport {
            examined: products.len(),
            ..RecategorizeReport::default()
        };

        for product in products {
            let record = product.record;
            let decision = self.classifier.explain(
                &record.title,
                &record.url,
                None,
                record.brand.as_deref(),
            );
            if decision.category.is_fallback() {
                report.fallback += 1;
                if !record.category.is_fallback() {
                    debug!(url = %record.url, category = %record.category, "keeping stored category");
                }
            }
            if decision.category == record.category || decision.category.is_fallback() {
                report.unchanged += 1;
                continue;
            }

            if apply && self.store().set_category(&record.url, decision.category).await? {
                report.applied += 1;
            }
            info!(
                url = %record.url,
                from = %record.category,
                to = %decision.category,
                stage = %decision.stage,
                applied = apply,
                "category change"
            );
            report.changes.push(CategoryChange {
                url: record.url,
                title: record.title,
                from: record.category,
                to: decision.category,
                stage: decision.stage,
                matched: decision.matched,
            });
        }

        info!(
            examined = report.examined,
            changed = report.changes.len(),
            applied = report.applied,
            fallback = report.fallback,
            "recategorization finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::memory::MemoryStore;
    use crate::database_ops::store::{StoreStats, StoredProduct};
    use chrono::TimeZone;

    fn pipeline_with(store: Arc<dyn ProductStore>) -> Pipeline {
        Pipeline::new(Arc::new(Taxonomy::builtin().unwrap()), store)
    }

    fn raw(url: &str, title: &str, price: &str) -> RawRecord {
        RawRecord {
            url: Some(url.to_string()),
            title: title.to_string(),
            price_text: price.to_string(),
            ..RawRecord::default()
        }
    }

    fn opts_at(hour: u32) -> RunOptions {
        RunOptions {
            scraped_at: Some(Utc.with_ymd_and_hms(2026, 6, 1, hour, 0, 0).unwrap()),
            log_sessions: true,
        }
    }

    /// Fails every write whose url contains `poison`.
    struct FlakyStore {
        inner: MemoryStore,
        poison: &'static str,
    }

    #[async_trait::async_trait]
    impl ProductStore for FlakyStore {
        fn backend(&self) -> &'static str {
            "flaky"
        }
        async fn upsert(&self, record: &CanonicalRecord) -> Result<UpsertOutcome, StoreError> {
            if record.url.contains(self.poison) {
                return Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut));
            }
            self.inner.upsert(record).await
        }
        async fn get(&self, url: &str) -> Result<Option<StoredProduct>, StoreError> {
            self.inner.get(url).await
        }
        async fn list(&self, filter: &ListFilter) -> Result<Vec<StoredProduct>, StoreError> {
            self.inner.list(filter).await
        }
        async fn set_category(&self, url: &str, category: Category) -> Result<bool, StoreError> {
            self.inner.set_category(url, category).await
        }
        async fn stats(&self) -> Result<StoreStats, StoreError> {
            self.inner.stats().await
        }
        async fn log_session(&self, session: &SessionLog) -> Result<(), StoreError> {
            self.inner.log_session(session).await
        }
        async fn recent_sessions(
            &self,
            website: Option<&str>,
            limit: u32,
        ) -> Result<Vec<SessionLog>, StoreError> {
            self.inner.recent_sessions(website, limit).await
        }
        async fn prune_sessions(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
            self.inner.prune_sessions(older_than).await
        }
    }

    #[tokio::test]
    async fn run_counts_every_outcome() {
        let pipeline = pipeline_with(Arc::new(MemoryStore::new()));
        let records = vec![
            Ok(raw("https://leaders.jo/en/product/galaxy-s24/", "Samsung Galaxy S24", "439.000 JOD")),
            Ok(raw("https://leaders.jo/en/product/galaxy-s24/#specs", "Samsung Galaxy S24", "429.000 JOD")),
            Ok(raw("https://smartbuy-me.com/products/ww70", "Samsung WW70T3020BS 7KG Washer", "329 JOD")),
            Ok(RawRecord {
                title: "No url".into(),
                ..RawRecord::default()
            }),
            Err(IngestError::malformed("line 5: expected value")),
        ];

        let summary = pipeline.run(records, &opts_at(9)).await;
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.rejected, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.processed(), 5);
        assert_eq!(summary.by_category.get(&Category::MobilePhones), Some(&2));
        assert_eq!(summary.by_category.get(&Category::LargeHomeAppliances), Some(&1));

        let stored = pipeline
            .store()
            .get("https://leaders.jo/en/product/galaxy-s24/")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.record.price_text, "429.000 JOD");
        assert_eq!(stored.record.source_website, "Leaders Center Jordan");
    }

    #[tokio::test]
    async fn storage_failure_does_not_stop_the_batch() {
        let pipeline = pipeline_with(Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            poison: "broken",
        }));
        let records = vec![
            Ok(raw("https://leaders.jo/en/product/broken-tv/", "Smart TV 55", "399 JOD")),
            Ok(raw("https://leaders.jo/en/product/galaxy-a55/", "Samsung Galaxy A55", "199 JOD")),
        ];

        let summary = pipeline.run(records, &opts_at(9)).await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.inserted, 1);

        let tally = &summary.by_website["Leaders Center Jordan"];
        assert_eq!(tally.status(), SessionStatus::Partial);

        let sessions = pipeline.store().recent_sessions(None, 10).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].status, SessionStatus::Partial);
        assert_eq!(sessions[0].products_count, 1);
    }

    #[tokio::test]
    async fn replayed_older_batch_is_skipped() {
        let pipeline = pipeline_with(Arc::new(MemoryStore::new()));
        let batch = || {
            vec![Ok(raw(
                "https://smartbuy-me.com/products/airfryer",
                "Philips Air Fryer XL",
                "89 JOD",
            ))]
        };
        pipeline.run(batch(), &opts_at(12)).await;
        let summary = pipeline.run(batch(), &opts_at(8)).await;
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.by_website["SmartBuy Jordan"].status(), SessionStatus::Success);
    }

    #[tokio::test]
    async fn recategorize_reports_then_applies() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline_with(store.clone());
        let mut stale = pipeline
            .prepare(
                &raw("https://leaders.jo/en/product/vivobook-15/", "ASUS VivoBook 15", "499 JOD"),
                Utc::now(),
            )
            .unwrap();
        stale.category = Category::MobilePhones;
        store.upsert(&stale).await.unwrap();

        let dry = pipeline.recategorize(false).await.unwrap();
        assert_eq!(dry.examined, 1);
        assert_eq!(dry.applied, 0);
        assert_eq!(dry.changes.len(), 1);
        assert_eq!(dry.changes[0].to, Category::ComputersLaptops);
        assert_eq!(dry.changes[0].stage, MatchStage::Keyword);

        let applied = pipeline.recategorize(true).await.unwrap();
        assert_eq!(applied.applied, 1);
        let again = pipeline.recategorize(false).await.unwrap();
        assert_eq!(again.unchanged, 1);
        assert!(again.changes.is_empty());
    }

    #[tokio::test]
    async fn recategorize_keeps_hint_derived_category() {
        let pipeline = pipeline_with(Arc::new(MemoryStore::new()));
        let url = "https://smartbuy-me.com/products/q9";
        let record = RawRecord {
            category_hint: Some("kitchen".into()),
            ..raw(url, "Model Q9", "49 JOD")
        };
        let summary = pipeline.run(vec![Ok(record)], &opts_at(9)).await;
        assert_eq!(summary.by_category.get(&Category::KitchenAppliances), Some(&1));

        let report = pipeline.recategorize(true).await.unwrap();
        assert_eq!(report.fallback, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.applied, 0);
        assert!(report.changes.is_empty());

        let stored = pipeline.store().get(url).await.unwrap().unwrap();
        assert_eq!(stored.record.category, Category::KitchenAppliances);
    }
}
