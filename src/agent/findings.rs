//! Data types flowing between pipeline stages.
//!
//! Sub-queries come out of the planner, tool results out of the tool
//! adapters, aggregated findings out of the retriever, and verdicts out
//! of the critic. All of them are plain values; only the orchestrator's
//! workflow state is mutable.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::ToolCategory;

/// How a stage arrived at its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Parsed from model output.
    Model,
    /// Derived from keyword or rule tables.
    Heuristic,
    /// Configured default after every other path failed.
    Fallback,
}

/// One independently answerable fragment of the user's question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubQuery {
    /// Text sent to the tool.
    pub text: String,
    /// Tool category that answers it.
    pub category: ToolCategory,
    /// The original question this was derived from.
    pub source: String,
    /// Dispatch rank; lower runs first.
    pub priority: f32,
}

/// Outcome of one tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Category of the tool that ran.
    pub category: ToolCategory,
    /// Sub-query text it ran for.
    pub sub_query: String,
    /// Whether the collaborator answered.
    pub success: bool,
    /// Collaborator payload; `Null` on failure.
    pub payload: Value,
    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall time spent, retries included.
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl ToolResult {
    /// A successful result.
    #[must_use]
    pub fn success(sub_query: &SubQuery, payload: Value, elapsed: Duration) -> Self {
        Self {
            category: sub_query.category,
            sub_query: sub_query.text.clone(),
            success: true,
            payload,
            error: None,
            elapsed,
        }
    }

    /// A failed result.
    #[must_use]
    pub fn failure(sub_query: &SubQuery, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            category: sub_query.category,
            sub_query: sub_query.text.clone(),
            success: false,
            payload: Value::Null,
            error: Some(error.into()),
            elapsed,
        }
    }
}

/// Counters describing retrieval work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Sub-queries issued.
    pub total: usize,
    /// Sub-queries whose tool answered.
    pub successful: usize,
    /// Sub-queries whose tool failed.
    pub failed: usize,
    /// Categories attempted.
    pub tools_used: BTreeSet<ToolCategory>,
    /// Failure descriptions, prefixed with the category.
    pub errors: Vec<String>,
    /// Retrieve steps folded into these counters.
    pub rounds: u32,
}

impl RunMetadata {
    /// Adds another set of counters to this one.
    pub fn merge(&mut self, other: &Self) {
        self.total += other.total;
        self.successful += other.successful;
        self.failed += other.failed;
        self.tools_used.extend(other.tools_used.iter().copied());
        self.errors.extend(other.errors.iter().cloned());
        self.rounds += other.rounds;
    }
}

/// Evidence gathered so far, bucketed by category.
///
/// Buckets only grow: every retrieve step appends, nothing is removed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatedFindings {
    /// Financial document payloads.
    pub documents: Vec<Value>,
    /// News payloads.
    pub news: Vec<Value>,
    /// Relationship graph payloads.
    pub graph: Vec<Value>,
    /// Open web payloads.
    pub web: Vec<Value>,
    /// Cumulative counters across all retrieve steps.
    pub metadata: RunMetadata,
}

impl AggregatedFindings {
    /// Payloads collected for `category`.
    #[must_use]
    pub fn bucket(&self, category: ToolCategory) -> &[Value] {
        match category {
            ToolCategory::Document => &self.documents,
            ToolCategory::News => &self.news,
            ToolCategory::Graph => &self.graph,
            ToolCategory::Web => &self.web,
        }
    }

    const fn bucket_mut(&mut self, category: ToolCategory) -> &mut Vec<Value> {
        match category {
            ToolCategory::Document => &mut self.documents,
            ToolCategory::News => &mut self.news,
            ToolCategory::Graph => &mut self.graph,
            ToolCategory::Web => &mut self.web,
        }
    }

    /// Appends one retrieve step's results.
    ///
    /// Returns the counters for this step alone; the cumulative counters
    /// in [`metadata`](Self::metadata) are updated as well.
    pub fn absorb(&mut self, results: Vec<ToolResult>) -> RunMetadata {
        let mut step = RunMetadata {
            rounds: 1,
            ..RunMetadata::default()
        };

        for result in results {
            step.total += 1;
            step.tools_used.insert(result.category);
            if result.success {
                step.successful += 1;
                self.bucket_mut(result.category).push(result.payload);
            } else {
                step.failed += 1;
                step.errors.push(format!(
                    "{}: {}",
                    result.category,
                    result.error.as_deref().unwrap_or("unknown error")
                ));
            }
        }

        self.metadata.merge(&step);
        step
    }

    /// Bucket lengths in category priority order.
    #[must_use]
    pub fn lengths(&self) -> [usize; 4] {
        ToolCategory::ALL.map(|c| self.bucket(c).len())
    }

    /// Total payloads across buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lengths().iter().sum()
    }

    /// Whether no payload has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Critic judgment of whether the evidence answers the question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SufficiencyVerdict {
    /// Evidence is adequate.
    pub sufficient: bool,
    /// Guidance for the next planning pass.
    pub feedback: String,
    /// Named gaps in the evidence.
    #[serde(default)]
    pub missing_areas: Vec<String>,
    /// How the verdict was reached.
    pub source: Provenance,
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
