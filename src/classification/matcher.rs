//! Phrase matching primitives shared by the classifier and taxonomy validation.
//!
//! Latin phrases must sit on word boundaries so `vivo` never fires inside
//! `vivobook` and `phone` never fires inside `headphones`. A plain `s`/`es`
//! plural is still accepted on the right edge. Arabic phrases match as plain
//! substrings: Arabic attaches prefixes such as `ال` or `ب` directly to the
//! word, and a boundary check would reject those legitimate hits.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RightEdge {
    /// Anything may follow (`galaxy s` in `galaxy s24`).
    Open,
    /// Word end, optionally after a plural suffix.
    Word,
    /// Exact token end.
    Token,
}

/// Whole-word phrase match, tolerating a plural suffix (`headphone` matches
/// `headphones`, `vivo` does not match `vivobook`).
pub fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    find_phrase(haystack, phrase, RightEdge::Word)
}

/// Left-boundary match with an open right edge, for model-line prefixes.
pub fn contains_prefix(haystack: &str, phrase: &str) -> bool {
    find_phrase(haystack, phrase, RightEdge::Open)
}

/// Whole-token match: boundaries required on both edges (for brand fields).
pub fn contains_token(haystack: &str, phrase: &str) -> bool {
    find_phrase(haystack, phrase, RightEdge::Token)
}

fn is_boundary(rest: &str) -> bool {
    !rest.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
}

fn find_phrase(haystack: &str, phrase: &str, edge: RightEdge) -> bool {
    if phrase.is_empty() {
        return false;
    }
    let needs_left = phrase.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    let needs_right = phrase.chars().next_back().is_some_and(|c| c.is_ascii_alphanumeric());

    haystack.match_indices(phrase).any(|(idx, _)| {
        let left_ok = !needs_left
            || !haystack[..idx]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_alphanumeric());
        let rest = &haystack[idx + phrase.len()..];
        let right_ok = !needs_right
            || match edge {
                RightEdge::Open => true,
                RightEdge::Token => is_boundary(rest),
                RightEdge::Word => {
                    is_boundary(rest)
                        || ["s", "es"]
                            .iter()
                            .any(|suffix| rest.strip_prefix(suffix).is_some_and(is_boundary))
                }
            };
        left_ok && right_ok
    })
}

/// Lower-case and collapse runs of whitespace to single spaces.
pub fn fold(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
