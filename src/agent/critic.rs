//! Sufficiency critic.
//!
//! Summarizes the evidence gathered so far and asks the model whether it
//! answers the question. The verdict's feedback steers the next planning
//! pass when evidence is judged insufficient.

use std::fmt::Write;

use async_trait::async_trait;
use tracing::{info, warn};

use super::config::{AgentConfig, CriticFallback};
use super::findings::{AggregatedFindings, Provenance, SufficiencyVerdict};
use super::parse::{bool_field, extract_object, string_field};
use super::policy::CallPolicy;
use super::prompt::build_critic_prompt;
use super::provider::LlmProvider;
use super::traits::Agent;
use crate::core::{ToolCategory, excerpt};

/// Excerpts shown per bucket in the digest.
const EXCERPTS_PER_BUCKET: usize = 2;
/// Graphemes per excerpt.
const EXCERPT_LEN: usize = 200;
/// Free-text markers that signal an insufficient verdict.
const INSUFFICIENCY_MARKERS: &[&str] = &[
    "불충분",
    "부족",
    "insufficient",
    "not sufficient",
    "not enough",
    "more information",
];

/// Agent that judges evidence sufficiency.
pub struct Critic {
    model: String,
    system_prompt: String,
    fallback: CriticFallback,
}

impl Critic {
    /// Creates a critic with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.chat_model.clone(),
            system_prompt,
            fallback: config.critic_fallback,
        }
    }

    /// Evaluates `findings` against `query`. Never fails.
    pub async fn evaluate(
        &self,
        provider: &dyn LlmProvider,
        policy: &CallPolicy,
        findings: &AggregatedFindings,
        query: &str,
    ) -> SufficiencyVerdict {
        let user_msg = build_critic_prompt(query, &Self::digest(findings));
        let verdict = match self.execute(provider, policy, &user_msg).await {
            Ok(response) => Self::parse_verdict(&response.content)
                .or_else(|| Self::scan_markers(&response.content))
                .unwrap_or_else(|| {
                    warn!("critic output inconclusive; applying fallback verdict");
                    self.fallback_verdict("critic output could not be interpreted")
                }),
            Err(e) => {
                warn!(error = %e, "critic unavailable; applying fallback verdict");
                self.fallback_verdict(&format!("critic unavailable: {e}"))
            }
        };
        info!(
            sufficient = verdict.sufficient,
            source = ?verdict.source,
            missing = verdict.missing_areas.len(),
            "sufficiency verdict"
        );
        verdict
    }

    /// Compact textual digest: counts and short excerpts per bucket.
    #[must_use]
    pub fn digest(findings: &AggregatedFindings) -> String {
        let meta = &findings.metadata;
        let mut out = format!(
            "retrieval: {} of {} sub-queries answered\n",
            meta.successful, meta.total
        );
        for category in ToolCategory::ALL {
            let bucket = findings.bucket(category);
            let _ = writeln!(out, "{category}: {} item(s)", bucket.len());
            for payload in bucket.iter().take(EXCERPTS_PER_BUCKET) {
                let _ = writeln!(out, "  - {}", excerpt(&payload.to_string(), EXCERPT_LEN));
            }
        }
        out
    }

    fn parse_verdict(content: &str) -> Option<SufficiencyVerdict> {
        let value = extract_object(content, "sufficiency")?;
        let sufficient = bool_field(&value, "sufficiency")?;
        let missing_areas = value
            .get("missing_areas")
            .and_then(serde_json::Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(serde_json::Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Some(SufficiencyVerdict {
            sufficient,
            feedback: string_field(&value, "feedback").unwrap_or_default(),
            missing_areas,
            source: Provenance::Model,
        })
    }

    fn scan_markers(content: &str) -> Option<SufficiencyVerdict> {
        let lowered = content.to_lowercase();
        INSUFFICIENCY_MARKERS
            .iter()
            .any(|m| lowered.contains(m))
            .then(|| SufficiencyVerdict {
                sufficient: false,
                feedback: excerpt(content, EXCERPT_LEN),
                missing_areas: Vec::new(),
                source: Provenance::Heuristic,
            })
    }

    fn fallback_verdict(&self, reason: &str) -> SufficiencyVerdict {
        SufficiencyVerdict {
            sufficient: self.fallback.sufficient(),
            feedback: reason.to_string(),
            missing_areas: Vec::new(),
            source: Provenance::Fallback,
        }
    }
}

#[async_trait]
impl Agent for Critic {
    fn name(&self) -> &'static str {
        "critic"
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
        512
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::findings::{SubQuery, ToolResult};
    use crate::agent::prompt::CRITIC_SYSTEM_PROMPT;
    use crate::agent::testing::ScriptedProvider;
    use std::time::Duration;

    fn critic(fallback: CriticFallback) -> Critic {
        let config = AgentConfig::builder()
            .critic_fallback(fallback)
            .build()
            .unwrap_or_else(|_| unreachable!());
        Critic::new(&config, CRITIC_SYSTEM_PROMPT.to_string())
    }

    fn policy() -> CallPolicy {
        CallPolicy::new(Duration::from_secs(1), 0, Duration::ZERO)
    }

    fn findings() -> AggregatedFindings {
        let sq = SubQuery {
            text: "삼성전자 실적".to_string(),
            category: ToolCategory::Document,
            source: "q".to_string(),
            priority: 1.0,
        };
        let mut findings = AggregatedFindings::default();
        findings.absorb(vec![
            ToolResult::success(&sq, serde_json::json!({"revenue": "79조"}), Duration::ZERO),
            ToolResult::success(&sq, serde_json::json!({"revenue": "74조"}), Duration::ZERO),
            ToolResult::success(&sq, serde_json::json!({"revenue": "70조"}), Duration::ZERO),
        ]);
        findings
    }

    #[test]
    fn test_digest_counts_and_caps_excerpts() {
        let digest = Critic::digest(&findings());
        assert!(digest.contains("retrieval: 3 of 3 sub-queries answered"));
        assert!(digest.contains("document: 3 item(s)"));
        assert!(digest.contains("news: 0 item(s)"));
        assert!(digest.contains("79조"));
        assert!(!digest.contains("70조"));
    }

    #[tokio::test]
    async fn test_model_verdict() {
        let provider = ScriptedProvider::default().reply(
            "critic",
            r#"{"sufficiency": false, "feedback": "뉴스 필요", "missing_areas": ["news"]}"#,
        );
        let verdict = critic(CriticFallback::AssumeSufficient)
            .evaluate(&provider, &policy(), &findings(), "q")
            .await;
        assert!(!verdict.sufficient);
        assert_eq!(verdict.feedback, "뉴스 필요");
        assert_eq!(verdict.missing_areas, vec!["news".to_string()]);
        assert_eq!(verdict.source, Provenance::Model);
    }

    #[tokio::test]
    async fn test_marker_heuristic() {
        let provider =
            ScriptedProvider::default().reply("critic", "증거가 불충분합니다. 뉴스가 필요합니다.");
        let verdict = critic(CriticFallback::AssumeSufficient)
            .evaluate(&provider, &policy(), &findings(), "q")
            .await;
        assert!(!verdict.sufficient);
        assert_eq!(verdict.source, Provenance::Heuristic);
    }

    #[tokio::test]
    async fn test_inconclusive_uses_configured_fallback() {
        let provider = ScriptedProvider::default().reply("critic", "Looks fine to me.");
        let verdict = critic(CriticFallback::AssumeSufficient)
            .evaluate(&provider, &policy(), &findings(), "q")
            .await;
        assert!(verdict.sufficient);
        assert_eq!(verdict.source, Provenance::Fallback);

        let provider = ScriptedProvider::default().reply("critic", "Looks fine to me.");
        let verdict = critic(CriticFallback::AssumeInsufficient)
            .evaluate(&provider, &policy(), &findings(), "q")
            .await;
        assert!(!verdict.sufficient);
    }

    #[tokio::test]
    async fn test_unavailable_provider_still_returns_verdict() {
        let provider = ScriptedProvider::default();
        let verdict = critic(CriticFallback::AssumeSufficient)
            .evaluate(&provider, &policy(), &AggregatedFindings::default(), "q")
            .await;
        assert!(verdict.sufficient);
        assert_eq!(verdict.source, Provenance::Fallback);
    }
}
