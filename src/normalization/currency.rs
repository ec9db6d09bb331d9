use crate::model::Currency;
use crate::taxonomy::Taxonomy;

/// Resolve the currency of a free-form price string.
///
/// Symbols are checked before three-letter codes: a symbol is unambiguous,
/// while a code may sit next to unrelated text. Falls back to the configured
/// default, so the result is total.
pub fn detect_currency(taxonomy: &Taxonomy, price_text: &str) -> Currency {
    let text = price_text.trim();
    if text.is_empty() {
        return taxonomy.default_currency();
    }

    if let Some(hit) = taxonomy
        .currency_symbols()
        .iter()
        .find(|s| text.contains(s.symbol.as_str()))
    {
        return hit.currency;
    }

    taxonomy
        .currency_codes()
        .iter()
        .find(|c| c.is_match(text))
        .map(|c| c.currency)
        .unwrap_or_else(|| taxonomy.default_currency())
}
