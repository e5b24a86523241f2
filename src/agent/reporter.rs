//! Report generation and simple-path responses.
//!
//! [`ReportGenerator`] writes the personalized report from an integrated
//! [`Narrative`]; [`SimpleResponder`] answers small talk directly. Both
//! fall back to a deterministic template when no model is reachable, so
//! neither ever fails.

use std::fmt::Write;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tracing::{debug, warn};

use super::config::AgentConfig;
use super::integrator::Narrative;
use super::policy::CallPolicy;
use super::prompt::{build_report_prompt, build_responder_prompt};
use super::provider::LlmProvider;
use super::traits::Agent;
use crate::storage::UserContext;

/// Disclaimer appended to template reports.
pub const DISCLAIMER: &str =
    "This report is for informational purposes only and is not investment advice.";

/// Agent that writes the final report.
pub struct ReportGenerator {
    model: String,
    system_prompt: String,
}

impl ReportGenerator {
    /// Creates a report generator using the configured report model.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.report_model.clone(),
            system_prompt,
        }
    }

    /// Writes the report for `narrative`. Never fails and never returns
    /// an empty string.
    pub async fn generate(
        &self,
        provider: &dyn LlmProvider,
        policy: &CallPolicy,
        narrative: &Narrative,
    ) -> String {
        let prompt = build_report_prompt(
            &narrative.query,
            &narrative.render_evidence(),
            &narrative.render_personal(),
        );
        match self.execute(provider, policy, &prompt).await {
            Ok(response) if !response.content.trim().is_empty() => {
                debug!(
                    tokens = response.usage.total_tokens,
                    "report generated by model"
                );
                response.content
            }
            Ok(_) => {
                warn!("model returned an empty report; using template");
                Self::template(narrative)
            }
            Err(e) => {
                warn!(error = %e, "report model unavailable; using template");
                Self::template(narrative)
            }
        }
    }

    /// Deterministic report built straight from the narrative.
    #[must_use]
    pub fn template(narrative: &Narrative) -> String {
        let mut out = format!("# {}\n\n## Summary\n\n", narrative.query);
        let coverage = &narrative.coverage;
        if narrative.has_evidence() {
            let _ = writeln!(
                out,
                "Evidence was gathered from {} of {} searches across {} source(s).",
                coverage.successful,
                coverage.total,
                coverage.tools_used.len()
            );
        } else {
            out.push_str("No supporting evidence could be retrieved for this question.\n");
        }
        if !narrative.entities.is_empty() {
            let names: Vec<&str> = narrative.entities.iter().map(|e| e.name.as_str()).collect();
            let _ = writeln!(out, "Entities covered: {}.", names.join(", "));
        }

        out.push_str("\n## Evidence-Based Analysis\n");
        if narrative.relationships.is_empty() && narrative.themes.is_empty() {
            out.push_str("\nNothing to analyze yet.\n");
        }
        if !narrative.relationships.is_empty() {
            out.push_str("\n### Relationships\n\n");
            for r in &narrative.relationships {
                let _ = writeln!(out, "- {} ({}) {}", r.source, r.relationship, r.target);
            }
        }
        for theme in &narrative.themes {
            let _ = write!(out, "\n### {}\n\n", theme.kind.title());
            for item in &theme.items {
                let _ = writeln!(out, "- **{}**: {}", item.title, item.snippet);
            }
        }

        out.push_str("\n## What This Means For You\n\n");
        let personal = &narrative.personal;
        match personal.risk_tolerance.as_deref() {
            Some(risk) => {
                let _ = writeln!(
                    out,
                    "- Weigh the evidence against your {risk} risk tolerance."
                );
            }
            None => out.push_str(
                "- No risk profile is stored; set one to get tailored implications.\n",
            ),
        }
        if let Some(goal) = &personal.investment_goal {
            let _ = writeln!(out, "- Consider how this fits your goal: {goal}.");
        }
        if !personal.holdings.is_empty() {
            let _ = writeln!(
                out,
                "- Current holdings to review: {}.",
                personal.holdings.join(", ")
            );
        }
        if !personal.preferred_sectors.is_empty() {
            let _ = writeln!(
                out,
                "- Preferred sectors: {}.",
                personal.preferred_sectors.join(", ")
            );
        }

        out.push_str("\n## Caveats\n\n");
        if !coverage.errors.is_empty() {
            let _ = writeln!(
                out,
                "- {} search(es) failed; the analysis may be incomplete.",
                coverage.errors.len()
            );
        }
        let _ = writeln!(out, "- {DISCLAIMER}");
        out
    }
}

#[async_trait]
impl Agent for ReportGenerator {
    fn name(&self) -> &'static str {
        "reporter"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        0.3
    }

    fn max_tokens(&self) -> u32 {
        2048
    }
}

/// Agent that answers simple questions without retrieval.
pub struct SimpleResponder {
    model: String,
    system_prompt: String,
}

impl SimpleResponder {
    /// Creates a responder using the chat model.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.chat_model.clone(),
            system_prompt,
        }
    }

    /// Answers `query` in light of the user's context. Never fails.
    pub async fn respond(
        &self,
        provider: &dyn LlmProvider,
        policy: &CallPolicy,
        query: &str,
        user: &UserContext,
    ) -> String {
        let now = Local::now();
        let prompt = build_responder_prompt(query, &user.summary, &now.to_rfc3339());
        match self.execute(provider, policy, &prompt).await {
            Ok(response) if !response.content.trim().is_empty() => response.content,
            Ok(_) => Self::canned(query, now),
            Err(e) => {
                warn!(error = %e, "responder unavailable; using canned reply");
                Self::canned(query, now)
            }
        }
    }

    /// Canned reply: a greeting, or the current time when asked.
    #[must_use]
    pub fn canned(query: &str, now: DateTime<Local>) -> String {
        let lowered = query.to_lowercase();
        if ["시간", "몇 시", "time"].iter().any(|m| lowered.contains(m)) {
            return format!("지금은 {} 입니다.", now.format("%Y-%m-%d %H:%M"));
        }
        if ["고마", "감사", "thank"].iter().any(|m| lowered.contains(m)) {
            return "천만에요! 궁금한 종목이나 섹터가 있으면 언제든 물어보세요.".to_string();
        }
        "안녕하세요! 기업, 섹터, 포트폴리오에 대해 무엇이든 물어보세요. \
         예: \"삼성전자 투자해도 될까요?\""
            .to_string()
    }
}

#[async_trait]
impl Agent for SimpleResponder {
    fn name(&self) -> &'static str {
        "responder"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        0.7
    }

    fn max_tokens(&self) -> u32 {
        512
    }
}
