//! Query classifier.
//!
//! Decides whether a question goes down the direct-response path or the
//! evidence-gathering path. The model decides when it can; otherwise a
//! small-talk heuristic does, defaulting to the complex path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::config::AgentConfig;
use super::findings::Provenance;
use super::parse::{extract_object, string_field};
use super::policy::CallPolicy;
use super::prompt::build_classifier_prompt;
use super::provider::LlmProvider;
use super::traits::Agent;
use crate::core::{ToolCategory, extract_companies};

/// Greeting, thanks, and small-talk markers.
const SMALL_TALK_MARKERS: &[&str] = &[
    "안녕", "하이", "반가", "반갑", "고마", "감사", "잘 지내", "누구", "이름이", "몇 시", "시간",
    "날짜", "며칠", "hi", "hello", "hey", "thanks", "thank", "morning", "bye",
];

/// Which path a question takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    /// Answer directly without evidence.
    Simple,
    /// Gather evidence before answering.
    Complex,
}

impl QueryKind {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Complex => "complex",
        }
    }
}

/// Classifier output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Selected path.
    pub kind: QueryKind,
    /// Short reason.
    pub justification: String,
    /// Whether the model or the heuristic decided.
    pub source: Provenance,
}

/// Agent that classifies questions as simple or complex.
pub struct QueryClassifier {
    model: String,
    system_prompt: String,
}

impl QueryClassifier {
    /// Creates a classifier with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.chat_model.clone(),
            system_prompt,
        }
    }

    /// Classifies `query`. Never fails.
    pub async fn classify(
        &self,
        provider: &dyn LlmProvider,
        policy: &CallPolicy,
        query: &str,
    ) -> Classification {
        match self
            .execute(provider, policy, &build_classifier_prompt(query))
            .await
        {
            Ok(response) => Self::parse_classification(&response.content).unwrap_or_else(|| {
                warn!(content = %response.content, "unparsable classification; using heuristic");
                Self::heuristic(query)
            }),
            Err(e) => {
                warn!(error = %e, "classifier unavailable; using heuristic");
                Self::heuristic(query)
            }
        }
    }

    /// Parses `{"type": ..., "reason": ...}` or a bare `simple`/`complex`.
    fn parse_classification(content: &str) -> Option<Classification> {
        let (label, reason) = extract_object(content, "type").map_or_else(
            || (content.trim().trim_matches('"').to_lowercase(), None),
            |value| {
                (
                    string_field(&value, "type").unwrap_or_default().to_lowercase(),
                    string_field(&value, "reason"),
                )
            },
        );

        let kind = match label.as_str() {
            "simple" => QueryKind::Simple,
            "complex" => QueryKind::Complex,
            _ => return None,
        };

        Some(Classification {
            kind,
            justification: reason.unwrap_or_else(|| format!("model labelled the question {label}")),
            source: Provenance::Model,
        })
    }

    /// Keyword heuristic: small talk without a company or research
    /// keyword is simple, everything else is complex.
    #[must_use]
    pub fn heuristic(query: &str) -> Classification {
        let lowered = query.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let marker = SMALL_TALK_MARKERS.iter().find(|m| {
            if m.is_ascii() {
                words.iter().any(|w| w == *m)
            } else {
                lowered.contains(*m)
            }
        });
        let research_signal = !extract_companies(query).is_empty()
            || ToolCategory::ALL.iter().any(|c| c.score(query) > 0);

        let classification = match marker {
            Some(marker) if !research_signal => Classification {
                kind: QueryKind::Simple,
                justification: format!("small-talk marker '{marker}'"),
                source: Provenance::Heuristic,
            },
            _ => Classification {
                kind: QueryKind::Complex,
                justification: "no small-talk marker; gathering evidence".to_string(),
                source: Provenance::Heuristic,
            },
        };
        debug!(kind = classification.kind.as_str(), "heuristic classification");
        classification
    }
}

#[async_trait]
impl Agent for QueryClassifier {
    fn name(&self) -> &'static str {
        "classifier"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn json_mode(&self) -> bool {
        true
    }

    fn max_tokens(&self) -> u32 {
        256
    }
}
