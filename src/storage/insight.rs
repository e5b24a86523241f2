//! Derived fields and ranking for stored insights.

use std::collections::HashSet;

use crate::core::{excerpt, significant_words, truncate_graphemes};

/// Graphemes kept in a derived title.
const TITLE_LEN: usize = 100;
/// Graphemes of the question used when no title line exists.
const QUERY_TITLE_LEN: usize = 50;
/// Graphemes kept in a derived summary.
const SUMMARY_LEN: usize = 200;

/// Content markers and the tag they add.
const TAG_MARKERS: &[(&[&str], &str)] = &[
    (&["투자", "매수", "매도", "invest"], "투자추천"),
    (&["위험", "리스크", "risk"], "위험분석"),
    (&["전망", "예상", "outlook", "forecast"], "시장전망"),
    (&["뉴스", "이슈", "news"], "시장이슈"),
    (&["기술", "혁신", "technology"], "기술분석"),
];

/// Content markers and the insight type they imply, first match wins.
const TYPE_MARKERS: &[(&[&str], &str)] = &[
    (&["포트폴리오", "portfolio"], "portfolio"),
    (&["섹터", "업종", "sector"], "sector_analysis"),
    (&["개별", "기업", "company"], "individual_stock"),
    (&["시장", "전체", "market"], "market_analysis"),
];

/// First non-empty line that is not a markdown heading, or a title built
/// from the question.
#[must_use]
pub fn derive_title(content: &str, query: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .map_or_else(
            || format!("{} analysis", truncate_graphemes(query.trim(), QUERY_TITLE_LEN)),
            |line| truncate_graphemes(line, TITLE_LEN),
        )
}

/// Whitespace-flattened opening of the content.
#[must_use]
pub fn derive_summary(content: &str) -> String {
    excerpt(content, SUMMARY_LEN)
}

/// Entities plus topic tags found in the content, deduplicated in order.
#[must_use]
pub fn derive_tags(content: &str, entities: &[String]) -> Vec<String> {
    let lowered = content.to_lowercase();
    let topical = TAG_MARKERS
        .iter()
        .filter(|(markers, _)| markers.iter().any(|m| lowered.contains(m)))
        .map(|(_, tag)| (*tag).to_string());

    let mut seen = HashSet::new();
    entities
        .iter()
        .cloned()
        .chain(topical)
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Coarse classification of the report content.
#[must_use]
pub fn classify_insight_type(content: &str) -> &'static str {
    let lowered = content.to_lowercase();
    TYPE_MARKERS
        .iter()
        .find(|(markers, _)| markers.iter().any(|m| lowered.contains(m)))
        .map_or("general", |(_, kind)| *kind)
}

/// Cosine similarity; 0.0 for mismatched or zero-length vectors.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Fraction of the query's significant words present in `text`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn keyword_overlap(query: &str, text: &str) -> f32 {
    let words = significant_words(query);
    if words.is_empty() {
        return 0.0;
    }
    let haystack = text.to_lowercase();
    let hits = words.iter().filter(|w| haystack.contains(w.as_str())).count();
    hits as f32 / words.len() as f32
}

/// Little-endian `f32` blob.
pub(crate) fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Inverse of [`encode_embedding`]; trailing partial floats are ignored.
pub(crate) fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_derive_title_skips_headings() {
        let report = "# 삼성전자 전망\n\n## Summary\n\n메모리 업황이 회복 중입니다.\n";
        assert_eq!(derive_title(report, "q"), "메모리 업황이 회복 중입니다.");
        assert_eq!(derive_title("# only\n## headings", "삼성전자 전망"), "삼성전자 전망 analysis");
    }

    #[test]
    fn test_derive_summary_truncates() {
        let long = "가".repeat(300);
        let summary = derive_summary(&long);
        assert!(summary.ends_with("..."));
        assert_eq!(summary.chars().count(), 203);
    }

    #[test]
    fn test_derive_tags_dedupes_entities_first() {
        let tags = derive_tags(
            "삼성전자 투자 리스크와 전망",
            &["삼성전자".to_string(), "삼성전자".to_string()],
        );
        assert_eq!(tags, vec!["삼성전자", "투자추천", "위험분석", "시장전망"]);
    }

    #[test_case("포트폴리오 재조정", "portfolio" ; "portfolio")]
    #[test_case("반도체 섹터 분석", "sector_analysis" ; "sector")]
    #[test_case("이 기업의 실적", "individual_stock" ; "company")]
    #[test_case("시장 전체 흐름", "market_analysis" ; "market")]
    #[test_case("hello", "general" ; "fallback")]
    fn test_classify_insight_type(content: &str, expected: &str) {
        assert_eq!(classify_insight_type(content), expected);
    }

    #[test]
    fn test_similarity_helpers() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < f32::EPSILON);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < f32::EPSILON);
        assert!(cosine_similarity(&[1.0], &[1.0, 2.0]).abs() < f32::EPSILON);
        assert!((keyword_overlap("삼성전자 반도체 전망", "반도체 업황 전망") - 0.5).abs() < 1e-6);
        assert!(keyword_overlap("a b", "anything").abs() < f32::EPSILON);
    }

    #[test]
    fn test_embedding_blob() {
        let v = vec![0.5_f32, -1.25, 3.0];
        assert_eq!(decode_embedding(&encode_embedding(&v)), v);
    }
}
