/// Collapse whitespace runs and trim. Case is preserved.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut to at most `max` characters (not bytes), never splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// First run of digits with embedded `.`/`,` separators.
fn number_run(text: &str) -> Option<&str> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Best-effort numeric amount from a display price.
///
/// Commas followed by exactly one or two digits are decimal separators
/// (`"12,5 €"`); any other comma groups thousands (`"1,299 JOD"`). The
/// display text is stored untouched either way.
pub fn parse_price_amount(price_text: &str) -> Option<f64> {
    let run = number_run(price_text)?.trim_end_matches(|c: char| c == '.' || c == ',');

    let normalized = if run.contains('.') && run.contains(',') {
        run.replace(',', "")
    } else if run.contains(',') {
        let parts: Vec<&str> = run.split(',').collect();
        match parts.as_slice() {
            [whole, frac] if (1..=2).contains(&frac.len()) => format!("{whole}.{frac}"),
            _ => run.replace(',', ""),
        }
    } else {
        run.to_string()
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}
