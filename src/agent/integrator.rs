//! Context integrator.
//!
//! Deterministically folds aggregated evidence and the user's stored
//! context into one [`Narrative`]: themed evidence, deduplicated
//! entities and relationships, and the personal facts the report needs.

use std::collections::HashSet;
use std::fmt::Write;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::findings::{AggregatedFindings, RunMetadata};
use crate::core::{ToolCategory, excerpt, extract_entities};
use crate::storage::UserContext;

/// Graphemes kept per evidence snippet.
const SNIPPET_LEN: usize = 400;
/// Evidence items kept per theme.
const MAX_ITEMS_PER_THEME: usize = 8;
/// Markers that move evidence into the risk theme.
const RISK_MARKERS: &[&str] = &[
    "리스크", "위험", "하락", "소송", "규제", "우려", "적자", "감소", "risk", "decline", "lawsuit",
    "downgrade",
];

/// A named entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    /// Display name.
    pub name: String,
    /// Entity type (`"company"`, `"sector"`, graph label).
    pub kind: String,
}

/// A typed edge between two entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    /// Source entity.
    pub source: String,
    /// Edge type.
    pub relationship: String,
    /// Target entity.
    pub target: String,
}

/// Theme an evidence item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeKind {
    /// Financial and performance evidence.
    Financial,
    /// Market trend and outlook evidence.
    MarketTrend,
    /// Entity and industry relationships.
    Relationships,
    /// Risk factors.
    Risk,
}

impl ThemeKind {
    /// Heading used when rendering.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::Financial => "Financial & performance",
            Self::MarketTrend => "Market trends",
            Self::Relationships => "Entity & industry relationships",
            Self::Risk => "Risk factors",
        }
    }
}

/// One piece of evidence, flattened from a tool payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Category of the tool that produced it.
    pub category: ToolCategory,
    /// Headline.
    pub title: String,
    /// Body excerpt.
    pub snippet: String,
    /// URL or issuer, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// Evidence grouped under one theme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    /// Theme.
    pub kind: ThemeKind,
    /// Items in collection order.
    pub items: Vec<EvidenceItem>,
}

/// Personal facts the report is tailored to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalContext {
    /// Risk tolerance.
    pub risk_tolerance: Option<String>,
    /// Investment goal.
    pub investment_goal: Option<String>,
    /// Experience level.
    pub experience_level: Option<String>,
    /// Preferred sectors.
    pub preferred_sectors: Vec<String>,
    /// Holdings as `name (quantity)`.
    pub holdings: Vec<String>,
    /// Interests.
    pub interests: Vec<String>,
    /// Stored one-line summary.
    pub summary: String,
}

/// Integrated view handed to the report generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    /// The question.
    pub query: String,
    /// Non-empty themes in [`ThemeKind`] order.
    pub themes: Vec<Theme>,
    /// Deduplicated entities.
    pub entities: Vec<Entity>,
    /// Deduplicated relationships.
    pub relationships: Vec<Relationship>,
    /// Personal facts.
    pub personal: PersonalContext,
    /// Retrieval counters.
    pub coverage: RunMetadata,
}

impl Narrative {
    /// Whether any evidence made it into a theme.
    #[must_use]
    pub fn has_evidence(&self) -> bool {
        self.themes.iter().any(|t| !t.items.is_empty())
    }

    /// Renders the evidence part as text for a prompt.
    #[must_use]
    pub fn render_evidence(&self) -> String {
        let mut out = String::new();
        if !self.entities.is_empty() {
            let names: Vec<&str> = self.entities.iter().map(|e| e.name.as_str()).collect();
            let _ = writeln!(out, "Entities: {}", names.join(", "));
        }
        if !self.relationships.is_empty() {
            let _ = writeln!(out, "Relationships:");
            for r in &self.relationships {
                let _ = writeln!(out, "- {} -[{}]-> {}", r.source, r.relationship, r.target);
            }
        }
        for theme in &self.themes {
            let _ = writeln!(out, "\n### {}", theme.kind.title());
            for item in &theme.items {
                let origin = item
                    .origin
                    .as_deref()
                    .map_or_else(String::new, |o| format!(" ({o})"));
                let _ = writeln!(
                    out,
                    "- [{}] {}{origin}: {}",
                    item.category, item.title, item.snippet
                );
            }
        }
        if out.is_empty() {
            out.push_str("No evidence was retrieved.");
        }
        out
    }

    /// Renders the personal part as text for a prompt.
    #[must_use]
    pub fn render_personal(&self) -> String {
        let p = &self.personal;
        let field = |v: &Option<String>| v.clone().unwrap_or_else(|| "unknown".to_string());
        let list = |v: &[String]| {
            if v.is_empty() {
                "none".to_string()
            } else {
                v.join(", ")
            }
        };
        format!(
            "Risk tolerance: {}\nInvestment goal: {}\nExperience: {}\nPreferred sectors: {}\nHoldings: {}\nInterests: {}\nSummary: {}",
            field(&p.risk_tolerance),
            field(&p.investment_goal),
            field(&p.experience_level),
            list(&p.preferred_sectors),
            list(&p.holdings),
            list(&p.interests),
            p.summary,
        )
    }
}

/// Builds a [`Narrative`] from evidence and user context.
///
/// Pure: both inputs are borrowed and left untouched.
#[must_use]
pub fn integrate(findings: &AggregatedFindings, user: &UserContext, query: &str) -> Narrative {
    let mut entities: Vec<Entity> = extract_entities(query)
        .into_iter()
        .map(|name| Entity {
            name,
            kind: "company".to_string(),
        })
        .collect();
    let mut relationships = Vec::new();

    for payload in &findings.graph {
        let (found_entities, found_relationships) = graph_records(payload);
        entities.extend(found_entities);
        relationships.extend(found_relationships);
    }

    let mut themes: Vec<Theme> = [
        ThemeKind::Financial,
        ThemeKind::MarketTrend,
        ThemeKind::Relationships,
        ThemeKind::Risk,
    ]
    .into_iter()
    .map(|kind| Theme {
        kind,
        items: Vec::new(),
    })
    .collect();

    for category in ToolCategory::ALL {
        for payload in findings.bucket(category) {
            for item in evidence_items(category, payload) {
                let kind = theme_for(&item);
                if let Some(theme) = themes.iter_mut().find(|t| t.kind == kind) {
                    theme.items.push(item);
                }
            }
        }
    }

    for theme in &mut themes {
        theme.items = dedup_evidence(std::mem::take(&mut theme.items));
        theme.items.truncate(MAX_ITEMS_PER_THEME);
    }
    themes.retain(|t| !t.items.is_empty());

    Narrative {
        query: query.to_string(),
        themes,
        entities: dedup_entities(entities),
        relationships: dedup_relationships(relationships),
        personal: personal_context(user),
        coverage: findings.metadata.clone(),
    }
}

/// Drops repeated entities (case-insensitive name), keeping the first.
#[must_use]
pub fn dedup_entities(entities: Vec<Entity>) -> Vec<Entity> {
    let mut seen = HashSet::new();
    entities
        .into_iter()
        .filter(|e| !e.name.trim().is_empty() && seen.insert(e.name.trim().to_lowercase()))
        .collect()
}

/// Drops repeated (source, relationship, target) triples, keeping the first.
#[must_use]
pub fn dedup_relationships(relationships: Vec<Relationship>) -> Vec<Relationship> {
    let mut seen = HashSet::new();
    relationships
        .into_iter()
        .filter(|r| seen.insert(r.clone()))
        .collect()
}

fn dedup_evidence(items: Vec<EvidenceItem>) -> Vec<EvidenceItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|i| seen.insert((i.title.clone(), i.snippet.clone())))
        .collect()
}

fn theme_for(item: &EvidenceItem) -> ThemeKind {
    let text = format!("{} {}", item.title, item.snippet).to_lowercase();
    if RISK_MARKERS.iter().any(|m| text.contains(m)) {
        return ThemeKind::Risk;
    }
    match item.category {
        ToolCategory::Document => ThemeKind::Financial,
        ToolCategory::Graph => ThemeKind::Relationships,
        ToolCategory::News | ToolCategory::Web => {
            if ToolCategory::Document.score(&text) > 0 {
                ThemeKind::Financial
            } else {
                ThemeKind::MarketTrend
            }
        }
    }
}

fn str_of<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Flattens a tool payload into evidence items.
fn evidence_items(category: ToolCategory, payload: &Value) -> Vec<EvidenceItem> {
    let fallback_title = str_of(payload, &["query"]).unwrap_or(category.as_str());

    let records = ["documents", "results", "items", "neighbors"]
        .iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_array));

    match records {
        Some(records) => records
            .iter()
            .filter_map(|record| {
                let title = str_of(record, &["title", "report_name", "name", "corp_name"])
                    .unwrap_or(fallback_title);
                let body = str_of(record, &["content", "snippet", "summary", "description"])
                    .map_or_else(|| record.to_string(), ToString::to_string);
                let snippet = excerpt(&body, SNIPPET_LEN);
                (!snippet.is_empty()).then(|| EvidenceItem {
                    category,
                    title: title.to_string(),
                    snippet,
                    origin: str_of(record, &["url", "link", "corp_name", "source"])
                        .map(ToString::to_string),
                })
            })
            .collect(),
        None if category == ToolCategory::Graph => Vec::new(),
        None => match payload {
            Value::Null => Vec::new(),
            Value::String(s) => vec![EvidenceItem {
                category,
                title: fallback_title.to_string(),
                snippet: excerpt(s, SNIPPET_LEN),
                origin: None,
            }],
            other => vec![EvidenceItem {
                category,
                title: fallback_title.to_string(),
                snippet: excerpt(&other.to_string(), SNIPPET_LEN),
                origin: None,
            }],
        },
    }
}

/// Entities and relationships in a graph payload.
fn graph_records(payload: &Value) -> (Vec<Entity>, Vec<Relationship>) {
    let entities = payload
        .get("entities")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|e| match e {
                    Value::String(name) => Some(Entity {
                        name: name.clone(),
                        kind: "entity".to_string(),
                    }),
                    Value::Object(_) => Some(Entity {
                        name: str_of(e, &["name"])?.to_string(),
                        kind: e
                            .get("types")
                            .and_then(Value::as_array)
                            .and_then(|t| t.first())
                            .and_then(Value::as_str)
                            .or_else(|| str_of(e, &["type", "kind"]))
                            .unwrap_or("entity")
                            .to_string(),
                    }),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let relationships = payload
        .get("relationships")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|r| {
                    Some(Relationship {
                        source: str_of(r, &["source"])?.to_string(),
                        relationship: str_of(r, &["relationship", "type"])?.to_string(),
                        target: str_of(r, &["target"])?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    (entities, relationships)
}

fn personal_context(user: &UserContext) -> PersonalContext {
    let profile = user.profile.clone().unwrap_or_default();
    PersonalContext {
        risk_tolerance: profile.risk_tolerance,
        investment_goal: profile.investment_goal,
        experience_level: profile.experience_level,
        preferred_sectors: profile.preferred_sectors,
        holdings: user
            .holdings
            .iter()
            .map(|h| format!("{} ({})", h.name, h.quantity))
            .collect(),
        interests: user.interests.clone(),
        summary: user.summary.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::findings::{SubQuery, ToolResult};
    use crate::storage::{Holding, UserProfile};
    use proptest::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn absorb(findings: &mut AggregatedFindings, category: ToolCategory, payload: Value) {
        let sq = SubQuery {
            text: "q".to_string(),
            category,
            source: "q".to_string(),
            priority: 1.0,
        };
        findings.absorb(vec![ToolResult::success(&sq, payload, Duration::ZERO)]);
    }

    fn sample_findings() -> AggregatedFindings {
        let mut findings = AggregatedFindings::default();
        absorb(
            &mut findings,
            ToolCategory::Document,
            json!({"query": "실적", "documents": [
                {"report_name": "분기보고서", "content": "매출 79조 영업이익 9조", "corp_name": "삼성전자"}
            ]}),
        );
        absorb(
            &mut findings,
            ToolCategory::Web,
            json!({"query": "전망", "results": [
                {"title": "반도체 업황", "snippet": "메모리 가격 반등 전망", "url": "https://a"},
                {"title": "규제 이슈", "snippet": "수출 규제 리스크 확대", "url": "https://b"}
            ]}),
        );
        let graph = json!({"entities": [{"name": "삼성전자", "types": ["Company"]}, "SK하이닉스"],
            "relationships": [{"source": "삼성전자", "relationship": "COMPETES_WITH", "target": "SK하이닉스"}]});
        absorb(&mut findings, ToolCategory::Graph, graph.clone());
        absorb(&mut findings, ToolCategory::Graph, graph);
        findings
    }

    #[test]
    fn test_integrate_groups_themes() {
        let narrative = integrate(
            &sample_findings(),
            &UserContext::anonymous("u1"),
            "삼성전자 투자해도 될까요?",
        );
        let kinds: Vec<ThemeKind> = narrative.themes.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![ThemeKind::Financial, ThemeKind::MarketTrend, ThemeKind::Risk]
        );
        assert_eq!(narrative.entities.len(), 2);
        assert_eq!(narrative.relationships.len(), 1);
        assert!(narrative.has_evidence());
        assert!(narrative.render_evidence().contains("COMPETES_WITH"));
    }

    #[test]
    fn test_integrate_does_not_mutate_inputs() {
        let findings = sample_findings();
        let before = serde_json::to_value(&findings).unwrap_or_default();
        let user = UserContext::anonymous("u1");
        let _ = integrate(&findings, &user, "q");
        assert_eq!(serde_json::to_value(&findings).unwrap_or_default(), before);
        assert_eq!(user, UserContext::anonymous("u1"));
    }

    #[test]
    fn test_integrate_merges_profile_and_holdings() {
        let user = UserContext {
            user_id: "u1".to_string(),
            profile: Some(UserProfile {
                user_id: "u1".to_string(),
                risk_tolerance: Some("conservative".to_string()),
                investment_goal: Some("income".to_string()),
                experience_level: None,
                preferred_sectors: vec!["반도체".to_string()],
            }),
            holdings: vec![Holding {
                symbol: "005930".to_string(),
                name: "삼성전자".to_string(),
                quantity: 10.0,
                avg_price: None,
            }],
            ..UserContext::default()
        };
        let narrative = integrate(&AggregatedFindings::default(), &user, "q");
        let rendered = narrative.render_personal();
        assert!(rendered.contains("Risk tolerance: conservative"));
        assert!(rendered.contains("Holdings: 삼성전자 (10)"));
        assert!(rendered.contains("Experience: unknown"));
        assert!(!narrative.has_evidence());
        assert_eq!(narrative.render_evidence(), "No evidence was retrieved.");
    }

    #[test]
    fn test_hyphenated_relationships_stay_distinct() {
        let edge = |source: &str, relationship: &str, target: &str| Relationship {
            source: source.to_string(),
            relationship: relationship.to_string(),
            target: target.to_string(),
        };
        let kept = dedup_relationships(vec![
            edge("A-B", "R", "C"),
            edge("A", "B-R", "C"),
            edge("A-B", "R", "C"),
        ]);
        assert_eq!(kept, vec![edge("A-B", "R", "C"), edge("A", "B-R", "C")]);
    }

    fn entity_strategy() -> impl Strategy<Value = Entity> {
        ("[a-cA-C]{1,2}", "[xy]").prop_map(|(name, kind)| Entity { name, kind })
    }

    fn relationship_strategy() -> impl Strategy<Value = Relationship> {
        ("[ab]", "[rs]", "[ab]").prop_map(|(source, relationship, target)| Relationship {
            source,
            relationship,
            target,
        })
    }

    proptest! {
        #[test]
        fn prop_entity_dedup_idempotent(entities in prop::collection::vec(entity_strategy(), 0..20)) {
            let once = dedup_entities(entities);
            let twice = dedup_entities(once.clone());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_relationship_dedup_idempotent(
            relationships in prop::collection::vec(relationship_strategy(), 0..20)
        ) {
            let once = dedup_relationships(relationships);
            let twice = dedup_relationships(once.clone());
            prop_assert_eq!(once, twice);
        }
    }
}
