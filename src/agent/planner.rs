//! Planner: decomposition, tool selection, and rewriting.
//!
//! Turns a question (and, when re-planning, the critic's feedback) into
//! an ordered list of 1 to [`MAX_SUB_QUERIES`] sub-queries, each routed
//! to one tool category. Every model call has a deterministic fallback,
//! so a plan is always produced.

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use super::config::{AgentConfig, MAX_SUB_QUERIES};
use super::findings::SubQuery;
use super::parse::{extract_object, extract_string_array, quoted_strings, string_field};
use super::policy::CallPolicy;
use super::prompt::{
    PromptSet, build_planner_prompt, build_rewriter_prompt, build_tool_selector_prompt,
};
use super::provider::LlmProvider;
use super::traits::Agent;
use crate::core::{ToolCategory, extract_companies, significant_words};

/// Minimum characters for a decomposed sub-query to be kept.
const MIN_SUB_QUERY_CHARS: usize = 6;
/// Minimum characters for a quoted fragment to count as a sub-query.
const MIN_QUOTED_CHARS: usize = 10;
/// Maximum quoted fragments taken from free-text output.
const MAX_QUOTED_FRAGMENTS: usize = 4;
/// Priority bonus for sub-queries that echo the original question.
const ECHO_BONUS: f32 = 0.5;

/// The three model roles the planner uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlannerRole {
    Decompose,
    SelectTool,
    Rewrite,
}

/// One planner role bound to its model and prompt.
struct PlannerAgent {
    role: PlannerRole,
    model: String,
    system_prompt: String,
}

#[async_trait]
impl Agent for PlannerAgent {
    fn name(&self) -> &'static str {
        match self.role {
            PlannerRole::Decompose => "planner",
            PlannerRole::SelectTool => "tool_selector",
            PlannerRole::Rewrite => "rewriter",
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn json_mode(&self) -> bool {
        // Decomposition returns a bare array, which JSON mode rejects.
        self.role == PlannerRole::SelectTool
    }

    fn temperature(&self) -> f32 {
        if self.role == PlannerRole::Decompose {
            0.3
        } else {
            0.0
        }
    }

    fn max_tokens(&self) -> u32 {
        match self.role {
            PlannerRole::Decompose => 1024,
            PlannerRole::SelectTool => 64,
            PlannerRole::Rewrite => 256,
        }
    }
}

/// Produces sub-query plans.
pub struct Planner {
    decomposer: PlannerAgent,
    selector: PlannerAgent,
    rewriter: PlannerAgent,
    max_sub_queries: usize,
    rewrite_enabled: bool,
    default_category: ToolCategory,
}

impl Planner {
    /// Creates a planner from configuration and prompts.
    #[must_use]
    pub fn new(config: &AgentConfig, prompts: &PromptSet) -> Self {
        let agent = |role, prompt: &str| PlannerAgent {
            role,
            model: config.chat_model.clone(),
            system_prompt: prompt.to_string(),
        };
        Self {
            decomposer: agent(PlannerRole::Decompose, &prompts.planner),
            selector: agent(PlannerRole::SelectTool, &prompts.tool_selector),
            rewriter: agent(PlannerRole::Rewrite, &prompts.rewriter),
            max_sub_queries: config.max_sub_queries.clamp(1, MAX_SUB_QUERIES),
            rewrite_enabled: config.rewrite_sub_queries,
            default_category: config.default_category,
        }
    }

    /// Plans sub-queries for `query`, optionally steered by critic feedback.
    ///
    /// Never returns an empty plan.
    pub async fn plan(
        &self,
        provider: &dyn LlmProvider,
        policy: &CallPolicy,
        query: &str,
        feedback: Option<&str>,
    ) -> Vec<SubQuery> {
        let Some(candidates) = self.decompose(provider, policy, query, feedback).await else {
            let plan = self.rule_based(query);
            info!(sub_queries = plan.len(), "using rule-based plan");
            return plan;
        };

        let routed = join_all(candidates.into_iter().map(|text| async move {
            let category = self.select_tool(provider, policy, &text).await;
            let text = if self.rewrite_enabled {
                self.rewrite(provider, policy, &text, category).await
            } else {
                text
            };
            (text, category)
        }))
        .await;

        let mut plan: Vec<SubQuery> = routed
            .into_iter()
            .map(|(text, category)| sub_query(text, category, query))
            .collect();
        sort_plan(&mut plan);
        info!(sub_queries = plan.len(), "plan ready");
        plan
    }

    /// Asks the model for sub-questions. `None` when the call fails or
    /// nothing usable comes back.
    async fn decompose(
        &self,
        provider: &dyn LlmProvider,
        policy: &CallPolicy,
        query: &str,
        feedback: Option<&str>,
    ) -> Option<Vec<String>> {
        let user_msg = build_planner_prompt(query, feedback, self.max_sub_queries);
        let response = match self.decomposer.execute(provider, policy, &user_msg).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "decomposition failed");
                return None;
            }
        };

        let mut candidates = parse_decomposition(&response.content);
        candidates.truncate(self.max_sub_queries);
        if candidates.is_empty() {
            warn!(content = %response.content, "decomposition returned no usable sub-queries");
            None
        } else {
            Some(candidates)
        }
    }

    /// Keyword routing first; the model breaks ties; the default category
    /// covers everything else.
    async fn select_tool(
        &self,
        provider: &dyn LlmProvider,
        policy: &CallPolicy,
        text: &str,
    ) -> ToolCategory {
        if let Some(category) = keyword_choice(text) {
            return category;
        }

        match self
            .selector
            .execute(provider, policy, &build_tool_selector_prompt(text))
            .await
        {
            Ok(response) => parse_tool_choice(&response.content).unwrap_or_else(|| {
                debug!(content = %response.content, "unrecognised tool choice");
                self.default_category
            }),
            Err(e) => {
                debug!(error = %e, "tool selection unavailable");
                self.default_category
            }
        }
    }

    /// Rewrites `text` for `category`; keeps the original on any failure.
    async fn rewrite(
        &self,
        provider: &dyn LlmProvider,
        policy: &CallPolicy,
        text: &str,
        category: ToolCategory,
    ) -> String {
        let user_msg = build_rewriter_prompt(text, category.as_str());
        match self.rewriter.execute(provider, policy, &user_msg).await {
            Ok(response) => accept_rewrite(&response.content).unwrap_or_else(|| text.to_string()),
            Err(e) => {
                debug!(error = %e, "rewrite unavailable");
                text.to_string()
            }
        }
    }

    /// Entity-driven plan used when decomposition fails.
    ///
    /// With a recognised company, one sub-query per keyword-matched angle
    /// (every angle when none match); otherwise the original question.
    #[must_use]
    pub fn rule_based(&self, query: &str) -> Vec<SubQuery> {
        let companies = extract_companies(query);
        let Some(company) = companies.first() else {
            let category = keyword_choice(query).unwrap_or(self.default_category);
            return vec![sub_query(query.trim().to_string(), category, query)];
        };

        let matched: Vec<ToolCategory> = ToolCategory::ALL
            .into_iter()
            .filter(|c| c.score(query) > 0)
            .collect();
        let angles = if matched.is_empty() {
            ToolCategory::ALL.to_vec()
        } else {
            matched
        };

        let mut plan: Vec<SubQuery> = angles
            .into_iter()
            .take(self.max_sub_queries)
            .map(|category| sub_query(angle_text(company, category), category, query))
            .collect();
        sort_plan(&mut plan);
        plan
    }
}

impl std::fmt::Debug for Planner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("max_sub_queries", &self.max_sub_queries)
            .field("rewrite_enabled", &self.rewrite_enabled)
            .field("default_category", &self.default_category)
            .finish_non_exhaustive()
    }
}

fn angle_text(company: &str, category: ToolCategory) -> String {
    match category {
        ToolCategory::Document => format!("{company} 최근 분기 실적 및 재무 현황"),
        ToolCategory::News => format!("{company} 최신 뉴스 및 주요 이슈"),
        ToolCategory::Graph => format!("{company} 관련 기업 및 공급망 관계"),
        ToolCategory::Web => format!("{company} 투자 전망 및 분석가 의견"),
    }
}

fn sub_query(text: String, category: ToolCategory, source: &str) -> SubQuery {
    let priority = priority_for(category, &text, source);
    SubQuery {
        text,
        category,
        source: source.to_string(),
        priority,
    }
}

/// Category rank, improved by half a rank when the sub-query repeats a
/// significant word of the original question.
fn priority_for(category: ToolCategory, text: &str, source: &str) -> f32 {
    let lowered = text.to_lowercase();
    let echoes = significant_words(source)
        .iter()
        .any(|w| lowered.contains(w.as_str()));
    let base = f32::from(category.priority());
    if echoes { base - ECHO_BONUS } else { base }
}

/// Stable sort by priority.
fn sort_plan(plan: &mut [SubQuery]) {
    plan.sort_by(|a, b| a.priority.total_cmp(&b.priority));
}

/// The unique best-scoring category, if any keyword matched.
fn keyword_choice(text: &str) -> Option<ToolCategory> {
    let scores: Vec<(ToolCategory, usize)> =
        ToolCategory::ALL.map(|c| (c, c.score(text))).to_vec();
    let best = scores.iter().map(|(_, s)| *s).max().unwrap_or(0);
    if best == 0 {
        return None;
    }
    let mut leaders = scores.iter().filter(|(_, s)| *s == best);
    let (category, _) = leaders.next()?;
    if leaders.next().is_some() {
        None
    } else {
        Some(*category)
    }
}

/// Sub-questions from model output: a JSON array, else quoted
/// fragments, else one per line.
fn parse_decomposition(content: &str) -> Vec<String> {
    let keep = |s: &String| s.chars().count() >= MIN_SUB_QUERY_CHARS;

    let mut items: Vec<String> = extract_string_array(content)
        .map(|items| items.into_iter().filter(keep).collect())
        .unwrap_or_default();

    if items.is_empty() {
        items = quoted_strings(content, MIN_QUOTED_CHARS)
            .into_iter()
            .take(MAX_QUOTED_FRAGMENTS)
            .collect();
    }

    if items.is_empty() {
        items = content
            .lines()
            .map(|line| {
                line.trim()
                    .trim_start_matches(|c: char| {
                        c.is_ascii_digit() || matches!(c, '.' | ')' | '-' | '*' | ' ')
                    })
                    .trim()
                    .to_string()
            })
            .filter(|line| !line.ends_with(':') && !line.starts_with('[') && keep(line))
            .collect();
    }

    let mut unique: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.contains(&item) {
            unique.push(item);
        }
    }
    unique
}

/// Reads `{"tool": ...}` or a bare category name.
fn parse_tool_choice(content: &str) -> Option<ToolCategory> {
    extract_object(content, "tool")
        .and_then(|v| string_field(&v, "tool"))
        .and_then(|s| ToolCategory::parse(&s))
        .or_else(|| ToolCategory::parse(content.trim().trim_matches('"')))
}

/// First non-empty line without quotes, if long enough to be a query.
fn accept_rewrite(content: &str) -> Option<String> {
    let line = content
        .lines()
        .map(|l| l.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`').trim())
        .find(|l| !l.is_empty())?;
    (line.chars().count() >= MIN_SUB_QUERY_CHARS).then(|| line.to_string())
}
