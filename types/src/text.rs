//! Small pure text helpers. All lengths are counted in `char`s.

/// Keep at most `max` characters of `s`.
#[must_use]
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Truncate a string to a maximum length, adding `...` if needed.
///
/// - Trims surrounding whitespace before truncating.
/// - The ellipsis counts toward the budget.
/// - Enforces a minimum `max` of 3 so the ellipsis fits.
#[must_use]
pub fn truncate_with_ellipsis(raw: &str, max: usize) -> String {
    let max = max.max(3);
    let raw = raw.trim();
    if raw.chars().count() <= max {
        return raw.to_string();
    }
    format!("{}...", truncate_chars(raw, max - 3))
}

/// Cap user-supplied text at `max` characters, then trim.
#[must_use]
pub fn sanitize_input(input: &str, max: usize) -> String {
    truncate_chars(input, max).trim().to_string()
}

/// Replace every whitespace run with a single space and trim the ends.
#[must_use]
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
