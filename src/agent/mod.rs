//! Multi-agent retrieval workflow.
//!
//! Classifies a question, plans sub-queries, gathers evidence from the
//! tool collaborators concurrently, judges sufficiency, and writes a
//! personalized report. Every LLM-backed role goes through the pluggable
//! [`LlmProvider`] and falls back to a deterministic strategy when the
//! provider is unavailable.
//!
//! # Architecture
//!
//! ```text
//! User query → Orchestrator
//!   ├── QueryClassifier (simple | complex)
//!   ├── simple:  SimpleResponder → answer
//!   └── complex:
//!       ├── Planner (decompose → route to tool category → rewrite)
//!       ├── Retriever → N concurrent ToolAdapters → AggregatedFindings
//!       ├── Critic (sufficient? else feedback → Planner, bounded)
//!       ├── integrate() → Narrative (themes + user context)
//!       └── ReportGenerator → final markdown report
//! ```

pub mod classifier;
pub mod client;
pub mod config;
pub mod critic;
pub mod event;
pub mod findings;
pub mod integrator;
pub mod message;
pub mod orchestrator;
pub mod parse;
pub mod planner;
pub mod policy;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod reporter;
pub mod retriever;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types
pub use classifier::{Classification, QueryClassifier, QueryKind};
pub use client::create_provider;
pub use config::{AgentConfig, CriticFallback, ToolsConfig};
pub use critic::Critic;
pub use event::ProgressEvent;
pub use findings::{
    AggregatedFindings, Provenance, RunMetadata, SubQuery, SufficiencyVerdict, ToolResult,
};
pub use integrator::{Narrative, integrate};
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use orchestrator::{Orchestrator, WorkflowOutcome, WorkflowStep};
pub use planner::Planner;
pub use policy::CallPolicy;
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use providers::OfflineProvider;
pub use reporter::{ReportGenerator, SimpleResponder};
pub use retriever::Retriever;
pub use traits::Agent;
