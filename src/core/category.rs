//! Tool categories for evidence gathering.
//!
//! This type lives in `core` so that the planner, the tool registry, the
//! findings buckets, and the CLI all share one definition of which
//! knowledge sources exist and how sub-queries are routed to them.

use serde::{Deserialize, Serialize};

/// Knowledge source a sub-query is routed to, ordered by priority.
///
/// Discriminants are the priority rank (`Document = 1` is consulted
/// first), so the derived [`Ord`] sorts plans in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    /// Structured financial documents (filings, statements, disclosures).
    Document = 1,
    /// News articles held in the document index.
    News = 2,
    /// Entity relationship graph.
    Graph = 3,
    /// Open web search.
    Web = 4,
}

const DOCUMENT_KEYWORDS: &[&str] = &[
    "재무", "실적", "영업이익", "매출", "공시", "사업보고서", "재무제표", "roe", "per", "pbr",
    "eps", "revenue", "earnings", "financial", "filing",
];

const NEWS_KEYWORDS: &[&str] = &[
    "뉴스", "최신", "발표", "소식", "언론", "보도", "기사", "이슈", "news", "latest",
    "announcement", "headline",
];

const GRAPH_KEYWORDS: &[&str] = &[
    "관계", "연관", "계열사", "파트너", "공급망", "관련 기업", "업종", "relationship",
    "affiliate", "supplier", "partner", "competitor",
];

const WEB_KEYWORDS: &[&str] = &[
    "전망", "분석", "의견", "시장", "업계", "동향", "트렌드", "환경", "outlook", "market",
    "trend", "opinion", "forecast",
];

impl ToolCategory {
    /// Every category in priority order.
    pub const ALL: [Self; 4] = [Self::Document, Self::News, Self::Graph, Self::Web];

    /// Parses a category name, accepting the legacy tool identifiers.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "document" | "documents" | "financial" | "financial_search" => Some(Self::Document),
            "news" | "company_news" => Some(Self::News),
            "graph" | "graph_search" => Some(Self::Graph),
            "web" | "websearch" | "web_search" => Some(Self::Web),
            _ => None,
        }
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::News => "news",
            Self::Graph => "graph",
            Self::Web => "web",
        }
    }

    /// Priority rank; lower is dispatched first.
    #[must_use]
    pub const fn priority(self) -> u8 {
        self as u8
    }

    /// Routing keywords for this category.
    #[must_use]
    pub const fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Document => DOCUMENT_KEYWORDS,
            Self::News => NEWS_KEYWORDS,
            Self::Graph => GRAPH_KEYWORDS,
            Self::Web => WEB_KEYWORDS,
        }
    }

    /// Counts keyword hits in `text`.
    ///
    /// ASCII keywords must match a whole word; Hangul keywords match as
    /// substrings because particles attach directly to the noun.
    #[must_use]
    pub fn score(self, text: &str) -> usize {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        self.keywords()
            .iter()
            .filter(|kw| {
                if kw.is_ascii() {
                    words.iter().any(|w| w == *kw)
                } else {
                    lowered.contains(*kw)
                }
            })
            .count()
    }
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
