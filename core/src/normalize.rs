//! Name normalization for cross-source achievement matching.
//!
//! Scraped display names, schema names and technical keys disagree on
//! casing, punctuation and whitespace. Matching happens on a reduced
//! comparison key instead: ASCII letters and digits only, lowercased.
//! Deliberately locale-independent (no culture-specific casing).

/// Reduce a human-readable label to its comparison key.
pub fn normalize_name(input: &str) -> String {
    input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
