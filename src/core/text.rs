//! Grapheme-aware text helpers.

use unicode_segmentation::UnicodeSegmentation;

/// Returns at most `max` graphemes of `text`.
#[must_use]
pub fn truncate_graphemes(text: &str, max: usize) -> String {
    text.graphemes(true).take(max).collect()
}

/// Returns a single-line excerpt of at most `max` graphemes, marking cuts with `...`.
#[must_use]
pub fn excerpt(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.graphemes(true).count() <= max {
        flat
    } else {
        format!("{}...", truncate_graphemes(&flat, max))
    }
}

/// Words longer than two graphemes, lowercased.
#[must_use]
pub fn significant_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.graphemes(true).count() > 2)
        .collect()
}
