//! Concurrent evidence retrieval.
//!
//! Dispatches every sub-query of a plan to the adapter registered for
//! its category, bounded by a semaphore, and folds the results into the
//! aggregated findings in plan order.
//!
//! Dispatch tasks are owned by a [`JoinSet`]: dropping a retrieve step
//! aborts every call still in flight. Sub-queries whose task never
//! reported a result are run again sequentially.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::config::AgentConfig;
use super::findings::{AggregatedFindings, RunMetadata, SubQuery, ToolResult};
use super::policy::CallPolicy;
use crate::tools::ToolRegistry;

/// Fans sub-queries out to tool adapters.
#[derive(Debug, Clone)]
pub struct Retriever {
    tools: ToolRegistry,
    policy: CallPolicy,
    max_concurrency: usize,
    parallel: bool,
}

impl Retriever {
    /// Creates a retriever over `tools` with the configured limits.
    #[must_use]
    pub fn new(tools: ToolRegistry, config: &AgentConfig) -> Self {
        Self {
            tools,
            policy: config.tool_policy(),
            max_concurrency: config.max_concurrency.max(1),
            parallel: config.parallel_retrieval,
        }
    }

    /// Executes `plan` and appends every result to `findings`.
    ///
    /// Each sub-query yields exactly one [`ToolResult`]; failures land in
    /// the metadata rather than aborting the step. Returns the counters
    /// for this step alone.
    pub async fn retrieve(
        &self,
        plan: &[SubQuery],
        findings: &mut AggregatedFindings,
    ) -> RunMetadata {
        let concurrent = self.parallel
            && plan.len() > 1
            && tokio::runtime::Handle::try_current().is_ok();
        let results = if concurrent {
            self.fan_out(plan).await
        } else {
            self.sequential(plan).await
        };
        debug_assert_eq!(results.len(), plan.len());

        let step = findings.absorb(results);
        info!(
            total = step.total,
            successful = step.successful,
            failed = step.failed,
            "retrieve step complete"
        );
        step
    }

    async fn sequential(&self, plan: &[SubQuery]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(plan.len());
        for sub_query in plan {
            let adapter = self.tools.get(sub_query.category);
            results.push(adapter.execute(sub_query, &self.policy).await);
        }
        results
    }

    /// Runs every sub-query on its own task, at most `max_concurrency`
    /// at a time, and collects results in plan order.
    async fn fan_out(&self, plan: &[SubQuery]) -> Vec<ToolResult> {
        let tasks = self.spawn_all(plan);
        self.gather(tasks, plan).await
    }

    /// Spawns one task per sub-query, tagged with its plan index.
    fn spawn_all(&self, plan: &[SubQuery]) -> JoinSet<(usize, ToolResult)> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for (index, sub_query) in plan.iter().enumerate() {
            let sem = Arc::clone(&semaphore);
            let adapter = self.tools.get(sub_query.category);
            let policy = self.policy;
            let sq = sub_query.clone();
            tasks.spawn(async move {
                let Ok(_permit) = sem.acquire().await else {
                    return (
                        index,
                        ToolResult::failure(&sq, "retrieval cancelled", Duration::ZERO),
                    );
                };
                debug!(category = %sq.category, sub_query = %sq.text, "dispatching");
                // A panicking adapter is a failed result, not a lost slot.
                let result = AssertUnwindSafe(adapter.execute(&sq, &policy))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        warn!(category = %sq.category, "tool adapter panicked");
                        ToolResult::failure(&sq, "tool adapter panicked", Duration::ZERO)
                    });
                (index, result)
            });
        }
        tasks
    }

    /// Drains `tasks` into plan order. Slots left empty by tasks that were
    /// cancelled before reporting are filled by a sequential pass.
    async fn gather(
        &self,
        mut tasks: JoinSet<(usize, ToolResult)>,
        plan: &[SubQuery],
    ) -> Vec<ToolResult> {
        let mut slots: Vec<Option<ToolResult>> = plan.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(result);
                    }
                }
                Err(e) => warn!(error = %e, "tool task did not complete"),
            }
        }

        let missing: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.is_none().then_some(index))
            .collect();
        if !missing.is_empty() {
            warn!(
                count = missing.len(),
                "concurrent dispatch incomplete; running remaining sub-queries sequentially"
            );
            let remaining: Vec<SubQuery> = missing
                .iter()
                .filter_map(|&index| plan.get(index).cloned())
                .collect();
            let rerun = self.sequential(&remaining).await;
            for (index, result) in missing.into_iter().zip(rerun) {
                if let Some(slot) = slots.get_mut(index) {
                    *slot = Some(result);
                }
            }
        }

        slots.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolCategory;
    use crate::error::AgentError;
    use crate::tools::ToolAdapter;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records peak concurrency and completions, optionally failing.
    struct Gauge {
        category: ToolCategory,
        fail: bool,
        delay: Duration,
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
        finished: AtomicUsize,
    }

    impl Gauge {
        fn new(category: ToolCategory, fail: bool) -> Arc<Self> {
            Self::with_delay(category, fail, Duration::from_millis(20))
        }

        fn with_delay(category: ToolCategory, fail: bool, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                category,
                fail,
                delay,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                finished: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ToolAdapter for Gauge {
        fn category(&self) -> ToolCategory {
            self.category
        }

        fn name(&self) -> &str {
            "gauge"
        }

        async fn fetch(&self, sub_query: &SubQuery) -> Result<Value, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.finished.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AgentError::Configuration {
                    message: "down".to_string(),
                });
            }
            Ok(json!({"query": sub_query.text}))
        }
    }

    fn plan(category: ToolCategory, n: usize) -> Vec<SubQuery> {
        (0..n)
            .map(|i| SubQuery {
                text: format!("sub-query {i}"),
                category,
                source: "q".to_string(),
                priority: 1.0,
            })
            .collect()
    }

    fn config(max_concurrency: usize, parallel: bool) -> AgentConfig {
        AgentConfig::builder()
            .max_concurrency(max_concurrency)
            .parallel_retrieval(parallel)
            .max_retries(0)
            .build()
            .unwrap_or_else(|_| unreachable!())
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let gauge = Gauge::new(ToolCategory::Web, false);
        let registry = ToolRegistry::new().with(gauge.clone());
        let retriever = Retriever::new(registry, &config(2, true));

        let mut findings = AggregatedFindings::default();
        let step = retriever
            .retrieve(&plan(ToolCategory::Web, 6), &mut findings)
            .await;

        assert_eq!(step.total, 6);
        assert_eq!(step.successful, 6);
        assert_eq!(findings.web.len(), 6);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(findings.web[0]["query"], "sub-query 0");
        assert_eq!(findings.web[5]["query"], "sub-query 5");
    }

    #[tokio::test]
    async fn test_failures_are_recorded_not_raised() {
        let ok = Gauge::new(ToolCategory::Document, false);
        let down = Gauge::new(ToolCategory::Graph, true);
        let registry = ToolRegistry::new().with(ok).with(down);
        let retriever = Retriever::new(registry, &config(4, true));

        let mut mixed = plan(ToolCategory::Document, 2);
        mixed.extend(plan(ToolCategory::Graph, 1));
        mixed.extend(plan(ToolCategory::News, 1));

        let mut findings = AggregatedFindings::default();
        let step = retriever.retrieve(&mixed, &mut findings).await;

        assert_eq!(step.total, 4);
        assert_eq!(step.successful, 2);
        assert_eq!(step.failed, 2);
        assert_eq!(step.errors.len(), 2);
        assert_eq!(findings.documents.len(), 2);
        assert!(findings.graph.is_empty());
        assert!(step.tools_used.contains(&ToolCategory::News));
    }

    #[tokio::test]
    async fn test_sequential_mode_runs_one_at_a_time() {
        let gauge = Gauge::new(ToolCategory::News, false);
        let registry = ToolRegistry::new().with(gauge.clone());
        let retriever = Retriever::new(registry, &config(8, false));

        let mut findings = AggregatedFindings::default();
        retriever
            .retrieve(&plan(ToolCategory::News, 3), &mut findings)
            .await;
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
        assert_eq!(gauge.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_dropped_retrieve_aborts_outstanding_calls() {
        let slow = Gauge::with_delay(ToolCategory::Web, false, Duration::from_millis(200));
        let registry = ToolRegistry::new().with(slow.clone());
        let retriever = Retriever::new(registry, &config(4, true));
        let plan = plan(ToolCategory::Web, 4);

        let mut findings = AggregatedFindings::default();
        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            retriever.retrieve(&plan, &mut findings),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(slow.calls.load(Ordering::SeqCst), 4);
        assert_eq!(slow.finished.load(Ordering::SeqCst), 0);
        assert!(findings.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_tasks_fall_back_to_sequential() {
        let gauge = Gauge::new(ToolCategory::News, false);
        let registry = ToolRegistry::new().with(gauge.clone());
        let retriever = Retriever::new(registry, &config(4, true));
        let plan = plan(ToolCategory::News, 3);

        // Aborted before any task is polled: nothing reaches the adapter.
        let mut tasks = retriever.spawn_all(&plan);
        tasks.abort_all();
        let results = retriever.gather(tasks, &plan).await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(results[0].sub_query, "sub-query 0");
        assert_eq!(results[2].sub_query, "sub-query 2");
        assert_eq!(gauge.calls.load(Ordering::SeqCst), 3);
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);

        let mut findings = AggregatedFindings::default();
        let step = findings.absorb(results);
        assert_eq!(step.successful, 3);
        assert_eq!(findings.news.len(), 3);
    }

    #[tokio::test]
    async fn test_panicking_adapter_is_a_failed_result() {
        struct Panics;

        #[async_trait]
        impl ToolAdapter for Panics {
            fn category(&self) -> ToolCategory {
                ToolCategory::Graph
            }

            fn name(&self) -> &str {
                "panics"
            }

            #[allow(clippy::panic)]
            async fn fetch(&self, _sub_query: &SubQuery) -> Result<Value, AgentError> {
                panic!("adapter bug")
            }
        }

        let registry = ToolRegistry::new().with(Arc::new(Panics));
        let retriever = Retriever::new(registry, &config(4, true));
        let mut findings = AggregatedFindings::default();
        let step = retriever
            .retrieve(&plan(ToolCategory::Graph, 2), &mut findings)
            .await;

        assert_eq!(step.total, 2);
        assert_eq!(step.failed, 2);
        assert!(step.errors.iter().all(|e| e.contains("panicked")));
    }

    #[tokio::test]
    async fn test_empty_plan() {
        let retriever = Retriever::new(ToolRegistry::new(), &config(2, true));
        let mut findings = AggregatedFindings::default();
        let step = retriever.retrieve(&[], &mut findings).await;
        assert_eq!(step.total, 0);
        assert!(findings.is_empty());
    }
}
