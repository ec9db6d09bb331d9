use std::sync::Arc;

use tracing::{debug, warn};

use crate::database_ops::store::{ProductStore, UpsertOutcome};
use crate::error::IngestError;
use crate::model::CanonicalRecord;

/// Dedup-by-url admission of classified candidates into the store.
///
/// The insert/update/skip decision is delegated to the store's single
/// conditional upsert; the gate never reads first and never retries.
#[derive(Clone)]
pub struct IngestionGate {
    store: Arc<dyn ProductStore>,
}

impl IngestionGate {
    pub fn new(store: Arc<dyn ProductStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ProductStore> {
        &self.store
    }

    pub async fn admit(&self, candidate: &CanonicalRecord) -> Result<UpsertOutcome, IngestError> {
        if candidate.url.trim().is_empty() {
            warn!(title = %candidate.title, "rejecting candidate without url");
            return Err(IngestError::malformed("missing url"));
        }
        let outcome = self.store.upsert(candidate).await?;
        debug!(
            url = %candidate.url,
            category = %candidate.category,
            %outcome,
            "admitted"
        );
        Ok(outcome)
    }
}
