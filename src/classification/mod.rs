//! Category assignment from title, URL, brand and listing hint.
//!
//! Stages run in a fixed order and the first hit wins:
//! keyword phrases over the combined title + URL path text, the brand field,
//! URL path patterns, the scraper's category hint, then the fallback.
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use strsim::jaro_winkler;
use url::Url;

use crate::model::Category;
use crate::taxonomy::{normalize_hint, Taxonomy};

pub mod matcher;

use matcher::fold;

/// Minimum Jaro-Winkler score for a category hint to be accepted as a
/// misspelling of a known alias.
pub const MIN_HINT_SIMILARITY: f64 = 0.92;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStage {
    Keyword,
    Brand,
    UrlPattern,
    Hint,
    Fallback,
}

impl fmt::Display for MatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchStage::Keyword => "keyword",
            MatchStage::Brand => "brand",
            MatchStage::UrlPattern => "url_pattern",
            MatchStage::Hint => "hint",
            MatchStage::Fallback => "fallback",
        })
    }
}

/// Outcome of a classification with the signal that decided it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub category: Category,
    pub stage: MatchStage,
    /// Phrase, brand entry, URL pattern or hint that matched. `None` for the fallback.
    pub matched: Option<String>,
}

impl Classification {
    fn hit(category: Category, stage: MatchStage, matched: &str) -> Self {
        Self {
            category,
            stage,
            matched: Some(matched.to_string()),
        }
    }

    fn fallback() -> Self {
        Self {
            category: Category::FALLBACK,
            stage: MatchStage::Fallback,
            matched: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CategoryClassifier {
    taxonomy: Arc<Taxonomy>,
}

impl CategoryClassifier {
    pub fn new(taxonomy: Arc<Taxonomy>) -> Self {
        Self { taxonomy }
    }

    pub fn classify(
        &self,
        title: &str,
        url: &str,
        category_hint: Option<&str>,
        brand: Option<&str>,
    ) -> Category {
        self.explain(title, url, category_hint, brand).category
    }

    /// Same decision as [`classify`](Self::classify), with the winning stage and match.
    pub fn explain(
        &self,
        title: &str,
        url: &str,
        category_hint: Option<&str>,
        brand: Option<&str>,
    ) -> Classification {
        let path = decoded_path(url);
        let text = search_text(title, path.as_deref());

        if let Some(rule) = self
            .taxonomy
            .keyword_rules()
            .iter()
            .find(|r| r.matches(&text))
        {
            return Classification::hit(rule.category, MatchStage::Keyword, &rule.phrase);
        }

        if let Some(brand) = brand.map(fold).filter(|b| !b.is_empty()) {
            if let Some(rule) = self
                .taxonomy
                .brand_rules()
                .iter()
                .find(|r| r.matches_token(&brand))
            {
                return Classification::hit(rule.category, MatchStage::Brand, &rule.phrase);
            }
        }

        if let Some(path) = path.as_deref() {
            let path = if path.ends_with('/') {
                path.to_string()
            } else {
                format!("{path}/")
            };
            if let Some(rule) = self
                .taxonomy
                .url_rules()
                .iter()
                .find(|r| path.contains(r.phrase.as_str()))
            {
                return Classification::hit(rule.category, MatchStage::UrlPattern, &rule.phrase);
            }
        }

        if let Some(hint) = category_hint.map(str::trim).filter(|h| !h.is_empty()) {
            if let Some(category) = self.resolve_hint(hint) {
                return Classification::hit(category, MatchStage::Hint, hint);
            }
        }

        Classification::fallback()
    }

    /// Map a listing hint to a category: exact label or key, configured alias,
    /// then a close misspelling of either.
    pub fn resolve_hint(&self, hint: &str) -> Option<Category> {
        if let Ok(category) = hint.trim().trim_matches('/').parse::<Category>() {
            return Some(category);
        }
        let key = normalize_hint(hint);
        if key.is_empty() {
            return None;
        }
        if let Some(category) = self.taxonomy.hint_alias(&key) {
            return Some(category);
        }
        if let Ok(category) = key.replace('-', "_").parse::<Category>() {
            return Some(category);
        }

        let category_keys = Category::ALL
            .into_iter()
            .map(|c| (c.key().replace('_', "-"), c));
        let alias_keys = self
            .taxonomy
            .hint_aliases()
            .map(|(alias, c)| (alias.to_string(), c));

        let mut best: Option<(f64, Category)> = None;
        for (candidate, category) in alias_keys.chain(category_keys) {
            let score = jaro_winkler(&key, &candidate);
            if score >= MIN_HINT_SIMILARITY && best.map_or(true, |(s, _)| score > s) {
                best = Some((score, category));
            }
        }
        best.map(|(_, c)| c)
    }
}

/// Percent-decoded, lower-cased URL path. Accepts bare paths as well as
/// absolute URLs; `None` when nothing path-like is present.
fn decoded_path(url: &str) -> Option<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }
    let raw_path = match Url::parse(trimmed) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) if trimmed.starts_with('/') => trimmed
            .split(|c| c == '?' || c == '#')
            .next()
            .unwrap_or_default()
            .to_string(),
        Err(_) => return None,
    };
    let decoded = urlencoding::decode(&raw_path)
        .map(|d| d.into_owned())
        .unwrap_or(raw_path);
    let lowered = decoded.to_lowercase();
    if lowered.trim_matches('/').is_empty() {
        None
    } else {
        Some(lowered)
    }
}

/// Folded title followed by the URL path split into words.
fn search_text(title: &str, path: Option<&str>) -> String {
    let mut text = fold(title);
    if let Some(path) = path {
        let words = fold(&path.replace(|c: char| matches!(c, '/' | '-' | '_' | '+' | '.'), " "));
        if !words.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&words);
        }
    }
    text
}
