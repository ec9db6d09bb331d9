use url::Url;

use crate::classification::matcher::fold;
use crate::taxonomy::Taxonomy;

/// Label used when neither the URL nor the hint yields anything usable.
pub const UNKNOWN_SOURCE: &str = "unknown-source";

/// Canonical identity for a product URL: absolute http(s), lower-case host,
/// fragment removed. `None` when the input is not a usable product URL.
pub fn canonical_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut parsed = Url::parse(trimmed).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.host_str().filter(|h| !h.is_empty())?;
    parsed.set_fragment(None);
    // Url already lower-cases registrable hosts during parsing
    Some(parsed.to_string())
}

/// Lower-case host of a URL, tolerating a missing scheme.
pub fn host_of(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed)
        .ok()
        .filter(|u| u.host_str().is_some())
        .or_else(|| Url::parse(&format!("http://{trimmed}")).ok())?;
    parsed
        .host_str()
        .map(|h| h.trim_end_matches('.').to_ascii_lowercase())
        .filter(|h| !h.is_empty())
}

/// Resolve the human-readable source website for a product URL.
///
/// Registered domains (and their subdomains) map to their label. Otherwise the
/// scraper's `source_hint` is tried against registry aliases, and as a last
/// resort the label is derived from the host itself. Never returns an empty
/// string.
pub fn detect_source(taxonomy: &Taxonomy, url: &str, source_hint: Option<&str>) -> String {
    let host = host_of(url);

    if let Some(host) = host.as_deref() {
        if let Some(entry) = taxonomy
            .sources()
            .iter()
            .find(|e| host == e.domain || host.ends_with(&format!(".{}", e.domain)))
        {
            return entry.label.clone();
        }
    }

    if let Some(hint) = source_hint.map(fold).filter(|h| !h.is_empty()) {
        if let Some(entry) = taxonomy.sources().iter().find(|e| {
            e.domain == hint || fold(&e.label) == hint || e.aliases.iter().any(|a| *a == hint)
        }) {
            return entry.label.clone();
        }
    }

    match host {
        Some(h) => {
            let label = h.strip_prefix("www.").unwrap_or(&h);
            if label.is_empty() {
                UNKNOWN_SOURCE.to_string()
            } else {
                label.to_string()
            }
        }
        None => UNKNOWN_SOURCE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taxonomy() -> Taxonomy {
        Taxonomy::builtin().unwrap()
    }

    #[test]
    fn registered_domains_map_to_labels() {
        let t = taxonomy();
        assert_eq!(
            detect_source(&t, "https://leaders.jo/en/product/oppo-reno-14/", None),
            "Leaders Center Jordan"
        );
        assert_eq!(
            detect_source(&t, "https://www.smartbuy-me.com/products/gts0803st0027", None),
            "SmartBuy Jordan"
        );
    }

    #[test]
    fn lookalike_domain_is_not_registered() {
        let t = taxonomy();
        assert_eq!(
            detect_source(&t, "https://notleaders.jo/p/1", None),
            "notleaders.jo"
        );
    }

    #[test]
    fn unknown_domain_derives_label() {
        let t = taxonomy();
        assert_eq!(
            detect_source(&t, "https://www.Example-Shop.com/p/1", None),
            "example-shop.com"
        );
        assert_eq!(detect_source(&t, "shop.example.org/item/9", None), "shop.example.org");
    }

    #[test]
    fn hint_used_when_host_unregistered() {
        let t = taxonomy();
        assert_eq!(
            detect_source(&t, "https://cdn.example.net/p/1", Some("SmartBuy")),
            "SmartBuy Jordan"
        );
    }

    #[test]
    fn never_empty() {
        let t = taxonomy();
        assert_eq!(detect_source(&t, "", None), UNKNOWN_SOURCE);
        assert_eq!(detect_source(&t, "   ", Some("   ")), UNKNOWN_SOURCE);
    }

    #[test]
    fn canonical_url_drops_fragment_and_rejects_non_http() {
        assert_eq!(
            canonical_url("https://Leaders.jo/en/product/x/#reviews").as_deref(),
            Some("https://leaders.jo/en/product/x/")
        );
        assert_eq!(
            canonical_url("https://smartbuy-me.com/products/a?variant=2").as_deref(),
            Some("https://smartbuy-me.com/products/a?variant=2")
        );
        assert!(canonical_url("ftp://leaders.jo/x").is_none());
        assert!(canonical_url("/en/product/x").is_none());
        assert!(canonical_url("").is_none());
    }
}
