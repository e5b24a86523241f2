//! End-to-end workflow tests against scripted collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{Value, json};

use insight_rs::agent::{
    AgentConfig, ChatRequest, ChatResponse, CriticFallback, LlmProvider, Orchestrator,
    ProgressEvent, PromptSet, QueryKind, SubQuery,
};
use insight_rs::core::ToolCategory;
use insight_rs::{AgentError, Container, MemoryStore, SqliteStore, ToolAdapter, ToolRegistry};

/// Replays queued replies per agent; agents without a reply see an
/// unavailable provider and fall back to their heuristics.
#[derive(Default)]
struct Script {
    replies: Mutex<HashMap<&'static str, VecDeque<String>>>,
    calls: Mutex<Vec<&'static str>>,
}

impl Script {
    fn reply(self, agent: &'static str, reply: &str) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.entry(agent).or_default().push_back(reply.to_string());
        }
        self
    }
}

#[async_trait]
impl LlmProvider for Script {
    fn name(&self) -> &'static str {
        "script"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.agent);
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.get_mut(request.agent)?.pop_front())
            .map(ChatResponse::text)
            .ok_or_else(|| AgentError::ProviderUnavailable {
                name: "script".to_string(),
            })
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, AgentError> {
        Err(AgentError::ProviderUnavailable {
            name: "script".to_string(),
        })
    }
}

/// Counts calls; fails every call when `broken`.
struct Counting {
    category: ToolCategory,
    broken: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl ToolAdapter for Counting {
    fn category(&self) -> ToolCategory {
        self.category
    }

    fn name(&self) -> &str {
        "counting"
    }

    async fn fetch(&self, sub_query: &SubQuery) -> Result<Value, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(AgentError::ToolExecution {
                tool: "counting".to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(json!({
            "query": sub_query.text,
            "documents": [{"title": sub_query.text, "content": "영업이익 증가, 수요 회복"}],
        }))
    }
}

struct Harness {
    orchestrator: Orchestrator,
    store: SqliteStore,
    adapters: Vec<Arc<Counting>>,
}

impl Harness {
    fn new(script: Script, broken: bool, ceiling: u32) -> Self {
        let adapters: Vec<Arc<Counting>> = ToolCategory::ALL
            .into_iter()
            .map(|category| {
                Arc::new(Counting {
                    category,
                    broken,
                    calls: AtomicUsize::new(0),
                })
            })
            .collect();
        let tools = adapters.iter().fold(ToolRegistry::new(), |registry, adapter| {
            registry.with(Arc::clone(adapter) as Arc<dyn ToolAdapter>)
        });

        let store = SqliteStore::in_memory().unwrap_or_else(|_| unreachable!());
        let config = AgentConfig::builder()
            .provider("offline")
            .max_iterations(ceiling)
            .critic_fallback(CriticFallback::AssumeSufficient)
            .max_retries(0)
            .llm_timeout(Duration::from_secs(2))
            .tool_timeout(Duration::from_secs(2))
            .build()
            .unwrap_or_else(|_| unreachable!());
        let container = Container::new(
            Arc::new(script),
            tools,
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        );
        let orchestrator = Orchestrator::with_prompts(container, config, &PromptSet::defaults());

        Self {
            orchestrator,
            store,
            adapters,
        }
    }

    fn tool_calls(&self) -> usize {
        self.adapters
            .iter()
            .map(|a| a.calls.load(Ordering::SeqCst))
            .sum()
    }

    fn categories_called(&self) -> usize {
        self.adapters
            .iter()
            .filter(|a| a.calls.load(Ordering::SeqCst) > 0)
            .count()
    }
}

fn steps(events: &[ProgressEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Processing { step, .. } => Some(step.as_str()),
            _ => None,
        })
        .collect()
}

fn terminal_count(events: &[ProgressEvent]) -> usize {
    events.iter().filter(|e| e.is_terminal()).count()
}

#[tokio::test]
async fn greeting_is_answered_without_tools() {
    let harness = Harness::new(Script::default(), false, 3);
    let events: Vec<ProgressEvent> = harness
        .orchestrator
        .stream("안녕하세요", "alice", "s1")
        .collect()
        .await;

    assert_eq!(harness.tool_calls(), 0);
    assert!(!steps(&events).contains(&"retrieve"));
    assert_eq!(terminal_count(&events), 1);
    assert!(matches!(events.last(), Some(ProgressEvent::Completed { .. })));

    let history = harness
        .store
        .history("alice", Some("s1"), 10)
        .await
        .unwrap_or_default();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn investment_question_fans_out_across_categories() {
    let harness = Harness::new(Script::default(), false, 3);
    let outcome = harness
        .orchestrator
        .execute("삼성전자 투자해도 될까요?", "alice", "s1")
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(outcome.classification.kind, QueryKind::Complex);
    assert!((1..=5).contains(&outcome.plan.len()));
    assert!(harness.categories_called() >= 2);
    assert!(outcome.verdict.is_some());
    assert!((1..=outcome.ceiling).contains(&outcome.iterations));
    assert!(!outcome.report.trim().is_empty());
    assert_eq!(outcome.metadata.successful + outcome.metadata.failed, outcome.metadata.total);
}

#[tokio::test]
async fn failing_tools_still_complete_with_a_report() {
    let harness = Harness::new(Script::default(), true, 2);
    let events: Vec<ProgressEvent> = harness
        .orchestrator
        .stream("삼성전자 투자해도 될까요?", "alice", "s1")
        .collect()
        .await;

    assert!(harness.tool_calls() > 0);
    assert!(steps(&events).contains(&"critic"));
    assert_eq!(terminal_count(&events), 1);
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::Completed { response }) if !response.trim().is_empty()
    ));
    assert!(!events.iter().any(|e| matches!(e, ProgressEvent::Error { .. })));

    let outcome = harness
        .orchestrator
        .execute("삼성전자 투자해도 될까요?", "alice", "s2")
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(outcome.buckets.values().all(|n| *n == 0));
    assert_eq!(outcome.metadata.successful, 0);
    assert!(!outcome.report.trim().is_empty());
}

#[tokio::test]
async fn insufficient_verdict_triggers_one_refinement_round() {
    let script = Script::default()
        .reply(
            "critic",
            r#"{"sufficiency": false, "feedback": "공급망 정보 부족", "missing_areas": ["공급망"]}"#,
        )
        .reply("critic", r#"{"sufficiency": true, "feedback": "충분"}"#);
    let harness = Harness::new(script, false, 3);
    let events: Vec<ProgressEvent> = harness
        .orchestrator
        .stream("삼성전자 투자해도 될까요?", "alice", "s1")
        .collect()
        .await;

    let visited = steps(&events);
    assert_eq!(visited.iter().filter(|s| **s == "retrieve").count(), 2);
    assert_eq!(visited.iter().filter(|s| **s == "critic").count(), 2);

    let outcome = harness
        .orchestrator
        .execute("삼성전자 투자해도 될까요?", "bob", "s1")
        .await
        .unwrap_or_else(|_| unreachable!());
    // The script is exhausted, so this run stops after one round.
    assert_eq!(outcome.iterations, 1);
    let evidence: usize = outcome.buckets.values().sum();
    assert_eq!(evidence, outcome.metadata.successful);
}

#[tokio::test]
async fn refinement_accumulates_evidence_from_both_rounds() {
    let script = Script::default()
        .reply("critic", r#"{"sufficiency": false, "feedback": "더 필요"}"#)
        .reply("critic", r#"{"sufficiency": true, "feedback": "충분"}"#);
    let harness = Harness::new(script, false, 3);
    let outcome = harness
        .orchestrator
        .execute("삼성전자 투자해도 될까요?", "alice", "s1")
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(outcome.iterations, 2);
    assert_eq!(outcome.metadata.rounds, 2);
    let evidence: usize = outcome.buckets.values().sum();
    assert_eq!(evidence, harness.tool_calls());
    assert!(evidence > outcome.plan.len());
}

#[tokio::test]
async fn reports_are_saved_as_searchable_insights() {
    use insight_rs::InsightStore;

    let harness = Harness::new(Script::default(), false, 1);
    let outcome = harness
        .orchestrator
        .execute("삼성전자 실적 전망", "alice", "s1")
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(outcome.insight_id.is_some());

    let found = harness
        .store
        .search("alice", "삼성전자 실적", None, 5)
        .await
        .unwrap_or_default();
    assert!(!found.is_empty());

    let context = harness
        .store
        .get_user_context("alice", None)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(context.frequent_entities.iter().any(|e| e.name == "삼성전자"));
}
