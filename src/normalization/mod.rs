//! Field-level normalization of scraped records: identity, currency, source
//! website and text cleanup. Category assignment lives in `classification`.
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};

use crate::error::IngestError;
use crate::model::{CanonicalRecord, Category, Currency, RawRecord};
use crate::taxonomy::Taxonomy;

pub mod currency;
pub mod source;
pub mod text;

pub use source::UNKNOWN_SOURCE;

/// Every field of a canonical record except the category and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFields {
    pub url: String,
    pub title: String,
    pub price_text: String,
    pub price_amount: Option<f64>,
    pub currency: Currency,
    pub source_website: String,
    pub brand: Option<String>,
    pub description: String,
}

impl NormalizedFields {
    /// Candidate for the store, stamped at classification time. The stamp is
    /// cut to microseconds, the finest precision every backend keeps.
    pub fn into_record(self, category: Category, scraped_at: DateTime<Utc>) -> CanonicalRecord {
        let scraped_at = scraped_at.trunc_subsecs(6);
        CanonicalRecord {
            url: self.url,
            title: self.title,
            price_text: self.price_text,
            price_amount: self.price_amount,
            currency: self.currency,
            source_website: self.source_website,
            category,
            brand: self.brand,
            description: self.description,
            scraped_at,
            first_seen_at: scraped_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldNormalizer {
    taxonomy: Arc<Taxonomy>,
}

impl FieldNormalizer {
    pub fn new(taxonomy: Arc<Taxonomy>) -> Self {
        Self { taxonomy }
    }

    pub fn detect_currency(&self, price_text: &str) -> Currency {
        currency::detect_currency(&self.taxonomy, price_text)
    }

    pub fn detect_source(&self, url: &str, source_hint: Option<&str>) -> String {
        source::detect_source(&self.taxonomy, url, source_hint)
    }

    /// Validate identity and normalize every scalar field of `raw`.
    ///
    /// Fails only with `MalformedInput`: a missing or non-http(s) url, or a
    /// title that is empty after whitespace cleanup.
    pub fn normalize(&self, raw: &RawRecord) -> Result<NormalizedFields, IngestError> {
        let raw_url = raw
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| IngestError::malformed("missing url"))?;
        let url = source::canonical_url(raw_url)
            .ok_or_else(|| IngestError::malformed(format!("invalid url {raw_url:?}")))?;

        let title = text::clean_text(&raw.title);
        if title.is_empty() {
            return Err(IngestError::malformed(format!("missing title for {url}")));
        }

        let price_text = text::clean_text(&raw.price_text);
        let brand = raw
            .brand
            .as_deref()
            .map(text::clean_text)
            .filter(|b| !b.is_empty());
        let description = raw
            .description
            .as_deref()
            .map(|d| text::truncate_chars(&text::clean_text(d), self.taxonomy.description_max_chars()))
            .unwrap_or_default();

        Ok(NormalizedFields {
            currency: self.detect_currency(&price_text),
            price_amount: text::parse_price_amount(&price_text),
            source_website: self.detect_source(&url, raw.source_hint.as_deref()),
            url,
            title,
            price_text,
            brand,
            description,
        })
    }
}
