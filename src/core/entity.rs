//! Dictionary-based entity detection.
//!
//! Recognises listed companies and industry sectors in free text. Used
//! by the rule-based planner, the context integrator, and when tagging
//! persisted messages and insights.

/// Company aliases and the canonical name used when only the alias appears.
const COMPANY_ALIASES: &[(&str, &str)] = &[
    ("삼성", "삼성전자"),
    ("lg", "LG전자"),
    ("sk", "SK하이닉스"),
    ("현대", "현대자동차"),
    ("포스코", "포스코홀딩스"),
    ("네이버", "NAVER"),
    ("naver", "NAVER"),
    ("카카오", "카카오"),
    ("롯데", "롯데쇼핑"),
    ("한화", "한화솔루션"),
    ("셀트리온", "셀트리온"),
    ("기아", "기아"),
];

/// Industry sector vocabulary.
const SECTORS: &[&str] = &[
    "반도체", "자동차", "화학", "철강", "금융", "통신", "바이오", "배터리", "2차전지", "인터넷",
    "게임", "조선", "건설",
];

/// Trailing particles stripped from a matched token.
const PARTICLES: &[&str] = &[
    "에서", "으로", "은", "는", "이", "가", "을", "를", "의", "에", "도", "와", "과", "로",
];

/// Extracts company names in order of first appearance, deduplicated.
///
/// A token containing an alias keeps its full spelling (`삼성바이오로직스`)
/// minus trailing particles; a bare alias resolves to its canonical name.
#[must_use]
pub fn extract_companies(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();

    for token in text.split_whitespace() {
        let token = token.trim_matches(|c: char| !c.is_alphanumeric());
        let lowered = token.to_lowercase();

        let Some((alias, canonical)) = COMPANY_ALIASES.iter().find(|(alias, _)| {
            lowered.strip_prefix(alias).is_some_and(|rest| {
                !(alias.is_ascii() && rest.starts_with(|c: char| c.is_ascii_alphabetic()))
            })
        }) else {
            continue;
        };

        let stripped = strip_particles(token);
        let name = if stripped.to_lowercase() == *alias {
            (*canonical).to_string()
        } else {
            stripped.to_string()
        };

        if !found.contains(&name) {
            found.push(name);
        }
    }

    found
}

/// Extracts sector words in vocabulary order.
#[must_use]
pub fn extract_sectors(text: &str) -> Vec<String> {
    SECTORS
        .iter()
        .filter(|s| text.contains(*s))
        .map(|s| (*s).to_string())
        .collect()
}

/// Companies followed by sectors, deduplicated.
#[must_use]
pub fn extract_entities(text: &str) -> Vec<String> {
    let mut entities = extract_companies(text);
    for sector in extract_sectors(text) {
        if !entities.contains(&sector) {
            entities.push(sector);
        }
    }
    entities
}

fn strip_particles(token: &str) -> &str {
    for particle in PARTICLES {
        if let Some(stem) = token.strip_suffix(particle)
            && !stem.is_empty()
        {
            return stem;
        }
    }
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("삼성전자 투자해도 될까요?", &["삼성전자"])]
    #[test_case("삼성 주가는?", &["삼성전자"])]
    #[test_case("LG전자의 실적", &["LG전자"])]
    #[test_case("sk와 현대는 어때", &["SK하이닉스", "현대자동차"])]
    #[test_case("오늘 날씨 어때", &[])]
    fn test_extract_companies(text: &str, expected: &[&str]) {
        assert_eq!(extract_companies(text), expected);
    }

    #[test]
    fn test_extract_entities_dedup() {
        let entities = extract_entities("삼성전자 반도체 그리고 삼성전자 반도체");
        assert_eq!(entities, vec!["삼성전자", "반도체"]);
    }

    #[test]
    fn test_no_false_positive_on_ascii_words() {
        assert!(extract_companies("skip this lgbt").is_empty());
    }
}
