//! Classification and normalization tables.
//!
//! The tables are data: a JSON document deserialized into [`TaxonomyFile`] and
//! compiled into an immutable [`Taxonomy`] that the normalizer and classifier
//! receive at construction. The built-in document lives in
//! `config/taxonomy.json`; `TAXONOMY_PATH` points at a replacement.
use std::path::Path;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::classification::matcher::{contains_phrase, contains_prefix, contains_token, fold};
use crate::model::{Category, Currency};

const BUILTIN_TAXONOMY: &str = include_str!("../config/taxonomy.json");

fn default_description_max_chars() -> usize {
    200
}

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("failed to read taxonomy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid taxonomy document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid pattern for currency code {code}: {source}")]
    Pattern {
        code: String,
        #[source]
        source: regex::Error,
    },
    #[error("{table} table has an empty entry for {category}")]
    EmptyEntry {
        table: &'static str,
        category: Category,
    },
    #[error("currency table has an empty symbol for {0}")]
    EmptySymbol(Currency),
    #[error("source registry entry {0:?} has an empty domain or label")]
    EmptySource(String),
    #[error("description_max_chars must be greater than zero")]
    ZeroDescriptionLimit,
}

/// On-disk shape of the taxonomy document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaxonomyFile {
    #[serde(default = "default_description_max_chars")]
    pub description_max_chars: usize,
    pub currency: CurrencyTable,
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
    pub keywords: Vec<KeywordGroup>,
    #[serde(default)]
    pub brands: Vec<BrandGroup>,
    #[serde(default)]
    pub url_patterns: Vec<UrlPatternGroup>,
    #[serde(default)]
    pub hint_aliases: IndexMap<String, Category>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyTable {
    pub default: Currency,
    /// Checked in order, before any code.
    pub symbols: Vec<CurrencySymbol>,
    /// Three-letter codes, checked in order after symbols.
    pub codes: Vec<Currency>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencySymbol {
    pub symbol: String,
    pub currency: Currency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Registered host; subdomains match too.
    pub domain: String,
    pub label: String,
    /// Alternative spellings accepted from a record's `source_hint`.
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordGroup {
    pub category: Category,
    /// Lower ranks are evaluated first; author specific phrases with low ranks.
    pub rank: u16,
    /// Whole words by default. A trailing `*` leaves the right edge open
    /// (`"galaxy s*"` matches `galaxy s24`).
    pub phrases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandGroup {
    pub category: Category,
    pub phrases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlPatternGroup {
    pub category: Category,
    pub patterns: Vec<String>,
}

/// One `(category, phrase, rank)` entry of a flattened lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseRule {
    pub category: Category,
    pub phrase: String,
    pub rank: u16,
    /// Authored with a trailing `*`.
    pub prefix: bool,
}

impl PhraseRule {
    /// Keyword semantics over folded text.
    pub fn matches(&self, text: &str) -> bool {
        if self.prefix {
            contains_prefix(text, &self.phrase)
        } else {
            contains_phrase(text, &self.phrase)
        }
    }

    /// Brand semantics: the whole brand token unless authored as a prefix.
    pub fn matches_token(&self, text: &str) -> bool {
        if self.prefix {
            contains_prefix(text, &self.phrase)
        } else {
            contains_token(text, &self.phrase)
        }
    }
}

/// A rule that can never win because an earlier rule of another category
/// matches every text it matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shadowing {
    pub table: &'static str,
    pub shadowed: PhraseRule,
    pub by: PhraseRule,
}

#[derive(Debug, Clone)]
pub struct CurrencyCode {
    pub currency: Currency,
    pattern: Regex,
}

impl CurrencyCode {
    fn new(currency: Currency) -> Result<Self, TaxonomyError> {
        let code = currency.code();
        let pattern = Regex::new(&format!(
            r"(?i)(?:^|[^a-z]){}(?:[^a-z]|$)",
            regex::escape(code)
        ))
        .map_err(|source| TaxonomyError::Pattern {
            code: code.to_string(),
            source,
        })?;
        Ok(Self { currency, pattern })
    }

    /// Code present as its own token (`"439 JOD"`, `"USD129"`), not inside a word.
    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// Compiled, immutable lookup tables.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    keyword_rules: Vec<PhraseRule>,
    brand_rules: Vec<PhraseRule>,
    url_rules: Vec<PhraseRule>,
    hint_aliases: IndexMap<String, Category>,
    default_currency: Currency,
    currency_symbols: Vec<CurrencySymbol>,
    currency_codes: Vec<CurrencyCode>,
    sources: Vec<SourceEntry>,
    description_max_chars: usize,
}

impl Taxonomy {
    /// The tables shipped with the crate.
    pub fn builtin() -> Result<Self, TaxonomyError> {
        Self::from_json_str(BUILTIN_TAXONOMY)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, TaxonomyError> {
        let file: TaxonomyFile = serde_json::from_str(raw)?;
        Self::compile(file)
    }

    pub fn from_path(path: &Path) -> Result<Self, TaxonomyError> {
        let raw = std::fs::read_to_string(path).map_err(|source| TaxonomyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Load `path` when given, otherwise the built-in tables. Shadowed rules
    /// are reported through tracing; they are authoring mistakes, not load errors.
    pub fn load(path: Option<&Path>) -> Result<Self, TaxonomyError> {
        let taxonomy = match path {
            Some(p) => {
                info!(path = %p.display(), "loading taxonomy");
                Self::from_path(p)?
            }
            None => Self::builtin()?,
        };
        for s in taxonomy.shadowed_rules() {
            warn!(
                table = s.table,
                phrase = %s.shadowed.phrase,
                category = %s.shadowed.category,
                shadowed_by = %s.by.phrase,
                shadowing_category = %s.by.category,
                "taxonomy rule can never match"
            );
        }
        info!(
            keywords = taxonomy.keyword_rules.len(),
            brands = taxonomy.brand_rules.len(),
            url_patterns = taxonomy.url_rules.len(),
            sources = taxonomy.sources.len(),
            "taxonomy ready"
        );
        Ok(taxonomy)
    }

    pub fn compile(file: TaxonomyFile) -> Result<Self, TaxonomyError> {
        if file.description_max_chars == 0 {
            return Err(TaxonomyError::ZeroDescriptionLimit);
        }

        let mut keyword_rules = Vec::new();
        for group in &file.keywords {
            for phrase in &group.phrases {
                keyword_rules.push(rule("keywords", group.category, phrase, group.rank)?);
            }
        }
        // stable: equal ranks keep document order
        keyword_rules.sort_by_key(|r| r.rank);

        let mut brand_rules = Vec::new();
        for (idx, group) in file.brands.iter().enumerate() {
            for phrase in &group.phrases {
                brand_rules.push(rule("brands", group.category, phrase, idx as u16)?);
            }
        }

        let mut url_rules = Vec::new();
        for (idx, group) in file.url_patterns.iter().enumerate() {
            for pattern in &group.patterns {
                let pattern = pattern.trim().to_lowercase();
                if pattern.is_empty() {
                    return Err(TaxonomyError::EmptyEntry {
                        table: "url_patterns",
                        category: group.category,
                    });
                }
                url_rules.push(PhraseRule {
                    category: group.category,
                    phrase: pattern,
                    rank: idx as u16,
                    prefix: false,
                });
            }
        }

        let hint_aliases = file
            .hint_aliases
            .into_iter()
            .map(|(alias, category)| (normalize_hint(&alias), category))
            .collect();

        for symbol in &file.currency.symbols {
            if symbol.symbol.trim().is_empty() {
                return Err(TaxonomyError::EmptySymbol(symbol.currency));
            }
        }
        let currency_codes = file
            .currency
            .codes
            .iter()
            .copied()
            .map(CurrencyCode::new)
            .collect::<Result<Vec<_>, _>>()?;

        let mut sources = Vec::with_capacity(file.sources.len());
        for entry in file.sources {
            let domain = entry.domain.trim().trim_start_matches("www.").to_ascii_lowercase();
            let label = entry.label.trim().to_string();
            if domain.is_empty() || label.is_empty() {
                return Err(TaxonomyError::EmptySource(entry.domain));
            }
            sources.push(SourceEntry {
                domain,
                label,
                aliases: entry.aliases.iter().map(|a| fold(a)).collect(),
            });
        }

        Ok(Self {
            keyword_rules,
            brand_rules,
            url_rules,
            hint_aliases,
            default_currency: file.currency.default,
            currency_symbols: file.currency.symbols,
            currency_codes,
            sources,
            description_max_chars: file.description_max_chars,
        })
    }

    /// Keyword rules in evaluation order.
    pub fn keyword_rules(&self) -> &[PhraseRule] {
        &self.keyword_rules
    }

    pub fn brand_rules(&self) -> &[PhraseRule] {
        &self.brand_rules
    }

    pub fn url_rules(&self) -> &[PhraseRule] {
        &self.url_rules
    }

    pub fn hint_alias(&self, normalized_hint: &str) -> Option<Category> {
        self.hint_aliases.get(normalized_hint).copied()
    }

    pub fn hint_aliases(&self) -> impl Iterator<Item = (&str, Category)> + '_ {
        self.hint_aliases.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn default_currency(&self) -> Currency {
        self.default_currency
    }

    pub fn currency_symbols(&self) -> &[CurrencySymbol] {
        &self.currency_symbols
    }

    pub fn currency_codes(&self) -> &[CurrencyCode] {
        &self.currency_codes
    }

    pub fn sources(&self) -> &[SourceEntry] {
        &self.sources
    }

    pub fn description_max_chars(&self) -> usize {
        self.description_max_chars
    }

    /// Rules that are pre-empted by an earlier rule of a different category.
    pub fn shadowed_rules(&self) -> Vec<Shadowing> {
        let mut out = shadowed_in("keywords", &self.keyword_rules, |text, r| r.matches(text));
        out.extend(shadowed_in("brands", &self.brand_rules, |text, r| r.matches_token(text)));
        out.extend(shadowed_in("url_patterns", &self.url_rules, |text, r| {
            text.contains(r.phrase.as_str())
        }));
        out
    }
}

fn rule(
    table: &'static str,
    category: Category,
    phrase: &str,
    rank: u16,
) -> Result<PhraseRule, TaxonomyError> {
    let trimmed = phrase.trim();
    let (body, prefix) = match trimmed.strip_suffix('*') {
        Some(body) => (body, true),
        None => (trimmed, false),
    };
    let phrase = fold(body);
    if phrase.is_empty() {
        return Err(TaxonomyError::EmptyEntry { table, category });
    }
    Ok(PhraseRule {
        category,
        phrase,
        rank,
        prefix,
    })
}

fn shadowed_in(
    table: &'static str,
    rules: &[PhraseRule],
    matches: impl Fn(&str, &PhraseRule) -> bool,
) -> Vec<Shadowing> {
    let mut out = Vec::new();
    for (j, later) in rules.iter().enumerate() {
        if let Some(earlier) = rules[..j]
            .iter()
            .find(|e| e.category != later.category && matches(&later.phrase, e))
        {
            out.push(Shadowing {
                table,
                shadowed: later.clone(),
                by: earlier.clone(),
            });
        }
    }
    out
}

/// `"/Mobile Phones/"` → `"mobile-phones"`.
pub fn normalize_hint(hint: &str) -> String {
    fold(hint.trim().trim_matches('/')).replace(|c: char| c == '_' || c == ' ', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tables_compile() {
        let t = Taxonomy::builtin().unwrap();
        assert_eq!(t.default_currency(), Currency::Jod);
        assert_eq!(t.description_max_chars(), 200);
        assert!(!t.keyword_rules().is_empty());
        assert_eq!(t.hint_alias("mobiles"), Some(Category::MobilePhones));
    }

    #[test]
    fn builtin_tables_have_no_shadowed_rules() {
        let t = Taxonomy::builtin().unwrap();
        let shadowed = t.shadowed_rules();
        assert!(shadowed.is_empty(), "shadowed rules: {shadowed:#?}");
    }

    #[test]
    fn keyword_rules_are_rank_ordered_and_stable() {
        let t = Taxonomy::builtin().unwrap();
        let ranks: Vec<u16> = t.keyword_rules().iter().map(|r| r.rank).collect();
        let mut sorted = ranks.clone();
        sorted.sort();
        assert_eq!(ranks, sorted);

        let pos = |p: &str| {
            t.keyword_rules()
                .iter()
                .position(|r| r.phrase == p)
                .unwrap()
        };
        assert!(pos("vivo book") < pos("vivo"));
        assert!(pos("phone case") < pos("phone"));
        assert!(pos("hair dryer") < pos("dryer"));
    }

    #[test]
    fn detects_shadowed_generic_phrase() {
        let raw = r#"{
            "currency": {"default": "USD", "symbols": [], "codes": []},
            "keywords": [
                {"category": "Mobile Phones", "rank": 1, "phrases": ["vivo"]},
                {"category": "Computers & Laptops", "rank": 2, "phrases": ["vivo book"]}
            ]
        }"#;
        let t = Taxonomy::from_json_str(raw).unwrap();
        let shadowed = t.shadowed_rules();
        assert_eq!(shadowed.len(), 1);
        assert_eq!(shadowed[0].shadowed.phrase, "vivo book");
        assert_eq!(shadowed[0].by.phrase, "vivo");
    }

    #[test]
    fn rejects_empty_phrase_and_unknown_fields() {
        let empty = r#"{
            "currency": {"default": "USD", "symbols": [], "codes": []},
            "keywords": [{"category": "Gaming", "rank": 1, "phrases": ["  "]}]
        }"#;
        assert!(matches!(
            Taxonomy::from_json_str(empty),
            Err(TaxonomyError::EmptyEntry { table: "keywords", category: Category::Gaming })
        ));

        let unknown = r#"{
            "currency": {"default": "USD", "symbols": [], "codes": []},
            "keywords": [],
            "categories": []
        }"#;
        assert!(matches!(
            Taxonomy::from_json_str(unknown),
            Err(TaxonomyError::Parse(_))
        ));
    }

    #[test]
    fn trailing_star_marks_prefix_rule() {
        let raw = r#"{
            "currency": {"default": "USD", "symbols": [], "codes": []},
            "keywords": [{"category": "Mobile Phones", "rank": 1, "phrases": ["Galaxy S*", "pixel", " * "]}]
        }"#;
        assert!(matches!(
            Taxonomy::from_json_str(raw),
            Err(TaxonomyError::EmptyEntry { table: "keywords", .. })
        ));

        let raw = raw.replace(r#", " * ""#, "");
        let t = Taxonomy::from_json_str(&raw).unwrap();
        let galaxy = &t.keyword_rules()[0];
        assert_eq!(galaxy.phrase, "galaxy s");
        assert!(galaxy.prefix);
        assert!(galaxy.matches("samsung galaxy s24"));
        let pixel = &t.keyword_rules()[1];
        assert!(!pixel.prefix);
        assert!(pixel.matches("google pixel 8"));
        assert!(!pixel.matches("pixelbook go"));
    }

    #[test]
    fn accessory_override_rank_holds_no_bare_nouns() {
        // generic single words belong at late ranks
        let t = Taxonomy::builtin().unwrap();
        let first_rank = t.keyword_rules()[0].rank;
        let bare: Vec<&str> = t
            .keyword_rules()
            .iter()
            .filter(|r| r.rank == first_rank && r.phrase.is_ascii() && !r.phrase.contains(' '))
            .map(|r| r.phrase.as_str())
            .collect();
        assert!(bare.is_empty(), "single-word phrases at rank {first_rank}: {bare:?}");
    }

    #[test]
    fn currency_code_needs_token_boundary() {
        let code = CurrencyCode::new(Currency::Eur).unwrap();
        assert!(code.is_match("12 eur"));
        assert!(code.is_match("EUR12"));
        assert!(!code.is_match("EUROPE edition"));
        assert!(!code.is_match("neuron"));
    }

    #[test]
    fn hint_normalization() {
        assert_eq!(normalize_hint("/Mobile Phones/"), "mobile-phones");
        assert_eq!(normalize_hint("power_banks"), "power-banks");
    }
}
