//! Workflow orchestrator.
//!
//! Sequences every agent for one request as an explicit state machine:
//!
//! ```text
//! ContextLoad → Classify ─┬─ simple ──→ SimpleRespond ─────────────────────────────┐
//!                         └─ complex ─→ Plan → Retrieve → Critic ─┬─ Integrate      │
//!                                        ↑                        │   → Report      │
//!                                        └── ¬sufficient ∧ i < n ─┘   → Persist     │
//!                                                                     → MemoryUpdate ←┘
//!                                                                     → Done
//! ```
//!
//! `Error` is the only other terminal. The Plan → Retrieve → Critic cycle
//! is the only edge that counts: the iteration counter rises by one per
//! critic pass and never exceeds the configured ceiling.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::classifier::{Classification, QueryClassifier, QueryKind};
use super::config::AgentConfig;
use super::critic::Critic;
use super::event::ProgressEvent;
use super::findings::{AggregatedFindings, RunMetadata, SubQuery, SufficiencyVerdict};
use super::integrator::{Narrative, integrate};
use super::planner::Planner;
use super::policy::CallPolicy;
use super::prompt::PromptSet;
use super::reporter::{ReportGenerator, SimpleResponder};
use super::retriever::Retriever;
use crate::container::Container;
use crate::core::{ToolCategory, extract_entities};
use crate::error::{AgentError, StorageError};
use crate::storage::{MessageRole, NewInsight, NewMessage, UserContext};

/// Longest accepted question, in bytes.
pub const MAX_QUERY_LEN: usize = 10_000;
/// Related past insights loaded with the user context.
const RELATED_INSIGHTS: usize = 3;

/// States of the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    /// Validate the question and load user memory.
    ContextLoad,
    /// Decide between the simple and complex path.
    Classify,
    /// Answer without evidence.
    SimpleRespond,
    /// Decompose into sub-queries.
    Plan,
    /// Fan sub-queries out to tool adapters.
    Retrieve,
    /// Judge evidence sufficiency.
    Critic,
    /// Merge evidence with the user context.
    Integrate,
    /// Write the report.
    Report,
    /// Store the report as an insight.
    Persist,
    /// Record the exchange in conversation history.
    MemoryUpdate,
    /// Finished with a response.
    Done,
    /// Finished with an error.
    Error,
}

impl WorkflowStep {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ContextLoad => "context_load",
            Self::Classify => "classify",
            Self::SimpleRespond => "simple_respond",
            Self::Plan => "plan",
            Self::Retrieve => "retrieve",
            Self::Critic => "critic",
            Self::Integrate => "integrate",
            Self::Report => "report",
            Self::Persist => "persist",
            Self::MemoryUpdate => "memory_update",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// Whether the workflow stops here.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    const fn message(self) -> &'static str {
        match self {
            Self::ContextLoad => "Loading user context",
            Self::Classify => "Classifying the question",
            Self::SimpleRespond => "Writing a direct answer",
            Self::Plan => "Planning sub-queries",
            Self::Retrieve => "Gathering evidence",
            Self::Critic => "Checking whether the evidence is sufficient",
            Self::Integrate => "Combining evidence with your profile",
            Self::Report => "Writing the report",
            Self::Persist => "Saving the insight",
            Self::MemoryUpdate => "Updating conversation memory",
            Self::Done => "Done",
            Self::Error => "Failed",
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The mutable record threaded through one request.
///
/// Only the orchestrator holds it, and only one step touches it at a time.
struct WorkflowState {
    query: String,
    user_id: String,
    session_id: String,
    user_context: UserContext,
    classification: Option<Classification>,
    plan: Vec<SubQuery>,
    findings: AggregatedFindings,
    last_round: RunMetadata,
    verdict: Option<SufficiencyVerdict>,
    iteration: u32,
    ceiling: u32,
    narrative: Option<Narrative>,
    report: Option<String>,
    insight_id: Option<i64>,
    error: Option<AgentError>,
    visited: Vec<WorkflowStep>,
    started: Instant,
}

impl WorkflowState {
    fn new(query: &str, user_id: &str, session_id: &str, ceiling: u32) -> Self {
        Self {
            query: query.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            user_context: UserContext::anonymous(user_id),
            classification: None,
            plan: Vec::new(),
            findings: AggregatedFindings::default(),
            last_round: RunMetadata::default(),
            verdict: None,
            iteration: 0,
            ceiling,
            narrative: None,
            report: None,
            insight_id: None,
            error: None,
            visited: Vec::new(),
            started: Instant::now(),
        }
    }

    fn fail(&mut self, error: AgentError) -> WorkflowStep {
        warn!(error = %error, "workflow failed");
        self.error = Some(error);
        WorkflowStep::Error
    }
}

/// A state machine positioned at one step.
struct Run {
    state: WorkflowState,
    step: WorkflowStep,
    entered: bool,
}

/// Everything a finished request produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    /// Report (complex path) or direct answer (simple path).
    pub report: String,
    /// Classifier decision.
    pub classification: Classification,
    /// Critic passes performed.
    pub iterations: u32,
    /// Iteration ceiling in force.
    pub ceiling: u32,
    /// Plan of the last round.
    pub plan: Vec<SubQuery>,
    /// Cumulative retrieval counters.
    pub metadata: RunMetadata,
    /// Payloads per evidence bucket.
    pub buckets: BTreeMap<ToolCategory, usize>,
    /// Last critic verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<SufficiencyVerdict>,
    /// Stored insight id, when persistence succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight_id: Option<i64>,
    /// States visited, in order.
    pub steps: Vec<WorkflowStep>,
    /// Wall time in milliseconds.
    pub elapsed_ms: u64,
}

/// Drives the agents through the workflow.
///
/// Holds only shared, immutable handles; concurrent requests each get
/// their own workflow state.
pub struct Orchestrator {
    container: Container,
    config: AgentConfig,
    classifier: QueryClassifier,
    planner: Planner,
    retriever: Retriever,
    critic: Critic,
    reporter: ReportGenerator,
    responder: SimpleResponder,
    llm_policy: CallPolicy,
    store_policy: CallPolicy,
}

impl Orchestrator {
    /// Creates an orchestrator over `container`.
    ///
    /// Loads prompt templates from the directory specified in
    /// [`AgentConfig::prompt_dir`], falling back to compiled-in defaults.
    #[must_use]
    pub fn new(container: Container, config: AgentConfig) -> Self {
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        Self::with_prompts(container, config, &prompts)
    }

    /// Creates an orchestrator with an explicit prompt set.
    #[must_use]
    pub fn with_prompts(container: Container, config: AgentConfig, prompts: &PromptSet) -> Self {
        Self {
            classifier: QueryClassifier::new(&config, prompts.classifier.clone()),
            planner: Planner::new(&config, prompts),
            retriever: Retriever::new(container.tools.clone(), &config),
            critic: Critic::new(&config, prompts.critic.clone()),
            reporter: ReportGenerator::new(&config, prompts.reporter.clone()),
            responder: SimpleResponder::new(&config, prompts.responder.clone()),
            llm_policy: config.llm_policy(),
            store_policy: config.store_policy(),
            container,
            config,
        }
    }

    /// Answers `query` and returns the report text.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidQuery`] for an empty or oversized
    /// question and [`AgentError::Orchestration`] if the workflow ends
    /// inconsistently. Collaborator failures never surface here.
    pub async fn process(
        &self,
        query: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<String, AgentError> {
        self.execute(query, user_id, session_id)
            .await
            .map(|outcome| outcome.report)
    }

    /// Runs the workflow to completion and returns everything it produced.
    ///
    /// # Errors
    ///
    /// Same as [`process`](Self::process).
    pub async fn execute(
        &self,
        query: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<WorkflowOutcome, AgentError> {
        let mut run = self.start(query, user_id, session_id);
        while !self.next_event(&mut run).await.is_terminal() {}
        Self::finish(run.state)
    }

    /// Runs the workflow as a stream of progress events.
    ///
    /// Yields one `processing` event as each state is entered, then
    /// exactly one `completed` or `error` event. Dropping the stream
    /// abandons the request; calls already issued are not rolled back.
    pub fn stream<'a>(
        &'a self,
        query: &str,
        user_id: &str,
        session_id: &str,
    ) -> impl Stream<Item = ProgressEvent> + use<'a> {
        let run = self.start(query, user_id, session_id);
        stream::unfold(Some(run), move |run| async move {
            let mut run = run?;
            let event = self.next_event(&mut run).await;
            let next = if event.is_terminal() { None } else { Some(run) };
            Some((event, next))
        })
    }

    fn start(&self, query: &str, user_id: &str, session_id: &str) -> Run {
        info!(user_id, session_id, query_len = query.len(), "request started");
        Run {
            state: WorkflowState::new(query, user_id, session_id, self.config.max_iterations),
            step: WorkflowStep::ContextLoad,
            entered: false,
        }
    }

    /// Executes the current step if it was already announced, then
    /// enters the next one and returns its event.
    async fn next_event(&self, run: &mut Run) -> ProgressEvent {
        if run.entered {
            let from = run.step;
            run.step = self.advance(&mut run.state, from).await;
            debug!(
                from = %from,
                to = %run.step,
                iteration = run.state.iteration,
                "state transition"
            );
        }
        run.entered = true;
        run.state.visited.push(run.step);
        Self::entry_event(&run.state, run.step)
    }

    fn entry_event(state: &WorkflowState, step: WorkflowStep) -> ProgressEvent {
        match step {
            WorkflowStep::Done => ProgressEvent::Completed {
                response: state.report.clone().unwrap_or_default(),
            },
            WorkflowStep::Error => ProgressEvent::Error {
                message: state.error.as_ref().map_or_else(
                    || "workflow failed".to_string(),
                    ToString::to_string,
                ),
            },
            step => ProgressEvent::Processing {
                step: step.as_str().to_string(),
                message: step.message().to_string(),
                data: Some(Self::entry_data(state, step)),
            },
        }
    }

    /// What the state holds on entry to `step`.
    fn entry_data(state: &WorkflowState, step: WorkflowStep) -> Value {
        let mut data = json!({
            "iteration": state.iteration,
            "ceiling": state.ceiling,
        });
        let extra = match step {
            WorkflowStep::ContextLoad => json!({
                "user_id": state.user_id,
                "session_id": state.session_id,
            }),
            WorkflowStep::Classify => json!({
                "has_profile": state.user_context.profile.is_some(),
                "holdings": state.user_context.holdings.len(),
                "related_insights": state.user_context.recent_insights.len(),
            }),
            WorkflowStep::SimpleRespond => json!({ "classification": state.classification }),
            WorkflowStep::Plan => json!({
                "classification": state.classification,
                "feedback": state.verdict.as_ref().map(|v| v.feedback.as_str()),
            }),
            WorkflowStep::Retrieve => json!({
                "sub_queries": state
                    .plan
                    .iter()
                    .map(|sq| json!({"text": sq.text, "category": sq.category}))
                    .collect::<Vec<_>>(),
            }),
            WorkflowStep::Critic => json!({
                "round": state.last_round,
                "buckets": bucket_counts(&state.findings),
            }),
            WorkflowStep::Integrate => json!({ "verdict": state.verdict }),
            WorkflowStep::Report => json!({
                "themes": state.narrative.as_ref().map_or(0, |n| n.themes.len()),
                "entities": state.narrative.as_ref().map_or(0, |n| n.entities.len()),
            }),
            WorkflowStep::Persist => json!({
                "report_chars": state.report.as_ref().map_or(0, |r| r.chars().count()),
            }),
            WorkflowStep::MemoryUpdate => json!({ "insight_id": state.insight_id }),
            WorkflowStep::Done | WorkflowStep::Error => Value::Null,
        };
        if let (Value::Object(base), Value::Object(extra)) = (&mut data, extra) {
            base.extend(extra);
        }
        data
    }

    /// Runs `step` and returns the state to enter next.
    async fn advance(&self, state: &mut WorkflowState, step: WorkflowStep) -> WorkflowStep {
        let provider = self.container.provider.as_ref();
        match step {
            WorkflowStep::ContextLoad => self.load_context(state).await,
            WorkflowStep::Classify => {
                let classification = self
                    .classifier
                    .classify(provider, &self.llm_policy, &state.query)
                    .await;
                info!(
                    kind = classification.kind.as_str(),
                    source = ?classification.source,
                    "question classified"
                );
                let next = match classification.kind {
                    QueryKind::Simple => WorkflowStep::SimpleRespond,
                    QueryKind::Complex => WorkflowStep::Plan,
                };
                state.classification = Some(classification);
                next
            }
            WorkflowStep::SimpleRespond => {
                let answer = self
                    .responder
                    .respond(provider, &self.llm_policy, &state.query, &state.user_context)
                    .await;
                state.report = Some(answer);
                WorkflowStep::MemoryUpdate
            }
            WorkflowStep::Plan => {
                let feedback = state
                    .verdict
                    .as_ref()
                    .filter(|v| !v.sufficient)
                    .map(planner_feedback);
                state.plan = self
                    .planner
                    .plan(provider, &self.llm_policy, &state.query, feedback.as_deref())
                    .await;
                WorkflowStep::Retrieve
            }
            WorkflowStep::Retrieve => {
                state.last_round = self
                    .retriever
                    .retrieve(&state.plan, &mut state.findings)
                    .await;
                WorkflowStep::Critic
            }
            WorkflowStep::Critic => {
                let verdict = self
                    .critic
                    .evaluate(provider, &self.llm_policy, &state.findings, &state.query)
                    .await;
                state.iteration += 1;
                debug_assert!(state.iteration <= state.ceiling);
                let again = !verdict.sufficient && state.iteration < state.ceiling;
                info!(
                    iteration = state.iteration,
                    ceiling = state.ceiling,
                    sufficient = verdict.sufficient,
                    refine = again,
                    "critic pass complete"
                );
                state.verdict = Some(verdict);
                if again {
                    WorkflowStep::Plan
                } else {
                    WorkflowStep::Integrate
                }
            }
            WorkflowStep::Integrate => {
                state.narrative = Some(integrate(
                    &state.findings,
                    &state.user_context,
                    &state.query,
                ));
                WorkflowStep::Report
            }
            WorkflowStep::Report => {
                let Some(narrative) = state.narrative.as_ref() else {
                    return state.fail(AgentError::Orchestration {
                        message: "report requested before integration".to_string(),
                    });
                };
                let report = self
                    .reporter
                    .generate(provider, &self.llm_policy, narrative)
                    .await;
                state.report = Some(report);
                WorkflowStep::Persist
            }
            WorkflowStep::Persist => {
                self.persist_insight(state).await;
                WorkflowStep::MemoryUpdate
            }
            WorkflowStep::MemoryUpdate => {
                self.update_memory(state).await;
                WorkflowStep::Done
            }
            WorkflowStep::Done | WorkflowStep::Error => step,
        }
    }

    async fn load_context(&self, state: &mut WorkflowState) -> WorkflowStep {
        if let Err(e) = validate_query(&state.query) {
            return state.fail(e);
        }

        let memory = &self.container.memory;
        let user_id = state.user_id.as_str();
        let session_id = state.session_id.as_str();
        let mut context = match self
            .store_policy
            .run("memory_store.get_user_context", || async move {
                memory
                    .get_user_context(user_id, Some(session_id))
                    .await
                    .map_err(|e| store_error("memory_store", &e))
            })
            .await
        {
            Ok(context) => context,
            Err(e) => {
                warn!(error = %e, "user context unavailable; continuing anonymously");
                UserContext::anonymous(user_id)
            }
        };

        let embedding = self.embed(&state.query).await;
        let insights = &self.container.insights;
        let query = state.query.as_str();
        let vector = embedding.as_deref();
        match self
            .store_policy
            .run("insight_store.search", || async move {
                insights
                    .search(user_id, query, vector, RELATED_INSIGHTS)
                    .await
                    .map_err(|e| store_error("insight_store", &e))
            })
            .await
        {
            Ok(related) => context.recent_insights = related,
            Err(e) => warn!(error = %e, "related insights unavailable"),
        }

        state.user_context = context;
        WorkflowStep::Classify
    }

    /// Embeds `text`; `None` when the provider cannot.
    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let provider = self.container.provider.as_ref();
        match self.llm_policy.run("embed", || provider.embed(text)).await {
            Ok(vector) if !vector.is_empty() => Some(vector),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "embedding unavailable");
                None
            }
        }
    }

    /// Stores the report. Failures are logged and swallowed.
    async fn persist_insight(&self, state: &mut WorkflowState) {
        let Some(report) = state.report.clone() else {
            return;
        };
        let embedding = self.embed(&report).await;
        let entities = state.narrative.as_ref().map_or_else(
            || extract_entities(&state.query),
            |n| n.entities.iter().map(|e| e.name.clone()).collect(),
        );
        let insight = NewInsight {
            user_id: state.user_id.clone(),
            query: state.query.clone(),
            content: report,
            entities,
            metadata: json!({
                "session_id": state.session_id,
                "iterations": state.iteration,
                "sufficient": state.verdict.as_ref().map(|v| v.sufficient),
                "retrieval": state.findings.metadata,
                "buckets": bucket_counts(&state.findings),
            }),
            embedding,
        };

        let insights = &self.container.insights;
        let insight = &insight;
        match self
            .store_policy
            .run("insight_store.store", || async move {
                insights
                    .store(insight.clone())
                    .await
                    .map_err(|e| store_error("insight_store", &e))
            })
            .await
        {
            Ok(id) => {
                debug!(insight_id = id, "insight stored");
                state.insight_id = Some(id);
            }
            Err(e) => warn!(error = %e, "failed to store insight"),
        }
    }

    /// Saves the question and the answer. Failures are logged and swallowed.
    async fn update_memory(&self, state: &WorkflowState) {
        let intent = state
            .classification
            .as_ref()
            .map(|c| c.kind.as_str().to_string());
        let entities = extract_entities(&state.query);
        let exchange = [
            (MessageRole::User, state.query.clone()),
            (
                MessageRole::Assistant,
                state.report.clone().unwrap_or_default(),
            ),
        ];

        let memory = &self.container.memory;
        for (role, content) in exchange {
            let message = NewMessage {
                user_id: state.user_id.clone(),
                session_id: state.session_id.clone(),
                role,
                content,
                entities: entities.clone(),
                intent: intent.clone(),
            };
            let message = &message;
            if let Err(e) = self
                .store_policy
                .run("memory_store.save_message", || async move {
                    memory
                        .save_message(message.clone())
                        .await
                        .map_err(|e| store_error("memory_store", &e))
                })
                .await
            {
                warn!(error = %e, role = role.as_str(), "failed to save message");
            }
        }
    }

    fn finish(state: WorkflowState) -> Result<WorkflowOutcome, AgentError> {
        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = state.started.elapsed().as_millis() as u64;
        if let Some(error) = state.error {
            info!(elapsed_ms, "request failed");
            return Err(error);
        }

        let (Some(report), Some(classification)) = (state.report, state.classification) else {
            return Err(AgentError::Orchestration {
                message: "workflow finished without a response".to_string(),
            });
        };
        info!(
            elapsed_ms,
            iterations = state.iteration,
            kind = classification.kind.as_str(),
            "request completed"
        );

        Ok(WorkflowOutcome {
            report,
            classification,
            iterations: state.iteration,
            ceiling: state.ceiling,
            buckets: bucket_counts(&state.findings),
            plan: state.plan,
            metadata: state.findings.metadata,
            verdict: state.verdict,
            insight_id: state.insight_id,
            steps: state.visited,
            elapsed_ms,
        })
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("container", &self.container)
            .field("max_iterations", &self.config.max_iterations)
            .finish_non_exhaustive()
    }
}

/// Rejects empty and oversized questions.
fn validate_query(query: &str) -> Result<(), AgentError> {
    if query.trim().is_empty() {
        return Err(AgentError::InvalidQuery {
            message: "query cannot be empty".to_string(),
        });
    }
    if query.len() > MAX_QUERY_LEN {
        return Err(AgentError::InvalidQuery {
            message: format!(
                "query exceeds maximum length ({} bytes, max {MAX_QUERY_LEN})",
                query.len()
            ),
        });
    }
    Ok(())
}

/// Critic feedback plus named gaps, as handed to the planner.
fn planner_feedback(verdict: &SufficiencyVerdict) -> String {
    if verdict.missing_areas.is_empty() {
        verdict.feedback.clone()
    } else {
        format!(
            "{} Missing: {}",
            verdict.feedback.trim(),
            verdict.missing_areas.join(", ")
        )
    }
}

fn bucket_counts(findings: &AggregatedFindings) -> BTreeMap<ToolCategory, usize> {
    ToolCategory::ALL
        .into_iter()
        .map(|c| (c, findings.bucket(c).len()))
        .collect()
}

fn store_error(store: &str, error: &StorageError) -> AgentError {
    AgentError::ToolExecution {
        tool: store.to_string(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::config::CriticFallback;
    use crate::agent::testing::ScriptedProvider;
    use crate::storage::{MemoryStore, SqliteStore};
    use crate::tools::{ToolAdapter, ToolRegistry};
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers every sub-query with one document-shaped record.
    struct Echo {
        category: ToolCategory,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ToolAdapter for Echo {
        fn category(&self) -> ToolCategory {
            self.category
        }

        fn name(&self) -> &str {
            "echo"
        }

        async fn fetch(&self, sub_query: &SubQuery) -> Result<Value, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({
                "query": sub_query.text,
                "documents": [{"title": sub_query.text, "content": "매출 증가"}],
            }))
        }
    }

    fn registry() -> (ToolRegistry, Vec<Arc<Echo>>) {
        let adapters: Vec<Arc<Echo>> = ToolCategory::ALL
            .into_iter()
            .map(|category| {
                Arc::new(Echo {
                    category,
                    calls: AtomicUsize::new(0),
                })
            })
            .collect();
        let mut registry = ToolRegistry::new();
        for adapter in &adapters {
            registry.register(Arc::clone(adapter) as Arc<dyn ToolAdapter>);
        }
        (registry, adapters)
    }

    fn config(ceiling: u32, fallback: CriticFallback) -> AgentConfig {
        AgentConfig::builder()
            .provider("offline")
            .max_iterations(ceiling)
            .critic_fallback(fallback)
            .max_retries(0)
            .llm_timeout(Duration::from_secs(2))
            .tool_timeout(Duration::from_secs(2))
            .build()
            .unwrap_or_else(|_| unreachable!())
    }

    fn orchestrator(
        provider: ScriptedProvider,
        ceiling: u32,
        fallback: CriticFallback,
    ) -> (Orchestrator, SqliteStore, Vec<Arc<Echo>>) {
        let store = SqliteStore::in_memory().unwrap_or_else(|_| unreachable!());
        let (tools, adapters) = registry();
        let container = Container::new(
            Arc::new(provider),
            tools,
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        );
        let orchestrator = Orchestrator::with_prompts(
            container,
            config(ceiling, fallback),
            &PromptSet::defaults(),
        );
        (orchestrator, store, adapters)
    }

    fn total_calls(adapters: &[Arc<Echo>]) -> usize {
        adapters.iter().map(|a| a.calls.load(Ordering::SeqCst)).sum()
    }

    #[tokio::test]
    async fn test_empty_query_ends_in_error_event() {
        let (orch, _store, adapters) =
            orchestrator(ScriptedProvider::default(), 2, CriticFallback::AssumeSufficient);
        let events: Vec<ProgressEvent> = orch.stream("   ", "u1", "s1").collect().await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], ProgressEvent::Error { .. }));
        assert_eq!(total_calls(&adapters), 0);

        let err = orch.process("", "u1", "s1").await;
        assert!(matches!(err, Err(AgentError::InvalidQuery { .. })));
    }

    #[tokio::test]
    async fn test_oversized_query_is_rejected() {
        let (orch, _store, _) =
            orchestrator(ScriptedProvider::default(), 2, CriticFallback::AssumeSufficient);
        let query = "가".repeat(MAX_QUERY_LEN);
        let err = orch.process(&query, "u1", "s1").await;
        assert!(matches!(err, Err(AgentError::InvalidQuery { .. })));
    }

    #[tokio::test]
    async fn test_simple_path_skips_retrieval() {
        let (orch, store, adapters) =
            orchestrator(ScriptedProvider::default(), 2, CriticFallback::AssumeSufficient);
        let outcome = orch
            .execute("안녕하세요", "u1", "s1")
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(outcome.classification.kind, QueryKind::Simple);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(total_calls(&adapters), 0);
        assert!(outcome.report.starts_with("안녕하세요!"));
        assert_eq!(
            outcome.steps,
            vec![
                WorkflowStep::ContextLoad,
                WorkflowStep::Classify,
                WorkflowStep::SimpleRespond,
                WorkflowStep::MemoryUpdate,
                WorkflowStep::Done,
            ]
        );

        let history = store
            .history("u1", Some("s1"), 10)
            .await
            .unwrap_or_default();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_fail_closed_critic_runs_to_ceiling() {
        let (orch, _store, adapters) =
            orchestrator(ScriptedProvider::default(), 3, CriticFallback::AssumeInsufficient);
        let outcome = orch
            .execute("삼성전자 투자해도 될까요?", "u1", "s1")
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.metadata.rounds, 3);
        assert_eq!(total_calls(&adapters), outcome.metadata.total);
        assert!(outcome.verdict.as_ref().is_some_and(|v| !v.sufficient));
        assert!(!outcome.report.is_empty());
        assert!(outcome.insight_id.is_some());
    }

    #[tokio::test]
    async fn test_stream_order_matches_visited_states() {
        let (orch, _store, _) =
            orchestrator(ScriptedProvider::default(), 2, CriticFallback::AssumeSufficient);
        let events: Vec<ProgressEvent> = orch
            .stream("삼성전자 투자해도 될까요?", "u1", "s1")
            .collect()
            .await;

        let steps: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Processing { step, .. } => Some(step.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            steps,
            [
                "context_load",
                "classify",
                "plan",
                "retrieve",
                "critic",
                "integrate",
                "report",
                "persist",
                "memory_update",
            ]
        );
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(matches!(
            events.last(),
            Some(ProgressEvent::Completed { response }) if !response.is_empty()
        ));
    }

    #[tokio::test]
    async fn test_refinement_feedback_reaches_planner() {
        let provider = ScriptedProvider::default()
            .reply(
                "critic",
                r#"{"sufficiency": false, "feedback": "need supplier data", "missing_areas": ["supply chain"]}"#,
            )
            .reply("critic", r#"{"sufficiency": true, "feedback": "ok"}"#);
        let (orch, _store, _) = orchestrator(provider, 3, CriticFallback::AssumeSufficient);
        let outcome = orch
            .execute("삼성전자 투자해도 될까요?", "u1", "s1")
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.metadata.rounds, 2);
    }

    #[test]
    fn test_planner_feedback_lists_missing_areas() {
        let verdict = SufficiencyVerdict {
            sufficient: false,
            feedback: "need more ".to_string(),
            missing_areas: vec!["risk".to_string(), "peers".to_string()],
            source: crate::agent::findings::Provenance::Model,
        };
        assert_eq!(planner_feedback(&verdict), "need more Missing: risk, peers");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn prop_iteration_never_exceeds_ceiling(ceiling in 1_u32..5, insufficient in any::<bool>()) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap_or_else(|_| unreachable!());
            let fallback = if insufficient {
                CriticFallback::AssumeInsufficient
            } else {
                CriticFallback::AssumeSufficient
            };
            let events: Vec<ProgressEvent> = runtime.block_on(async {
                let (orch, _store, _) = orchestrator(ScriptedProvider::default(), ceiling, fallback);
                let events: Vec<ProgressEvent> =
                    orch.stream("삼성전자 실적 전망", "u1", "s1").collect().await;
                events
            });

            for event in &events {
                if let ProgressEvent::Processing { data: Some(data), .. } = event {
                    let iteration = data["iteration"].as_u64().unwrap_or(u64::MAX);
                    prop_assert!(iteration <= u64::from(ceiling));
                }
            }
            let critic_passes = events
                .iter()
                .filter(|e| matches!(e, ProgressEvent::Processing { step, .. } if step == "critic"))
                .count();
            let expected = if insufficient { ceiling as usize } else { 1 };
            prop_assert_eq!(critic_passes, expected);
        }
    }
}
