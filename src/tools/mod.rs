//! Tool adapters.
//!
//! Each [`ToolCategory`] is served by one [`ToolAdapter`] that turns a
//! sub-query into a JSON payload from an external collaborator. Adapters
//! never raise: [`ToolAdapter::execute`] converts every failure, timeout
//! included, into a failed [`ToolResult`].
//!
//! # Collaborators
//!
//! | Category   | Adapter                  | Backend                    |
//! |------------|--------------------------|----------------------------|
//! | `document` | `ElasticsearchAdapter`   | Elasticsearch text search  |
//! | `news`     | `ElasticsearchAdapter`   | same index, `type: news`   |
//! | `graph`    | `Neo4jAdapter`           | Neo4j HTTP transaction API |
//! | `web`      | `SerperAdapter`          | Serper Google search       |
//!
//! HTTP adapters require the `http-tools` feature; a category without a
//! configured collaborator gets an [`UnavailableAdapter`].

mod registry;

#[cfg(feature = "http-tools")]
mod elasticsearch;
#[cfg(feature = "http-tools")]
mod http;
#[cfg(feature = "http-tools")]
mod neo4j;
#[cfg(feature = "http-tools")]
mod serper;

use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::agent::{CallPolicy, SubQuery, ToolResult};
use crate::core::ToolCategory;
use crate::error::AgentError;

pub use registry::ToolRegistry;

#[cfg(feature = "http-tools")]
pub use elasticsearch::{ElasticsearchAdapter, parse_search_hits};
#[cfg(feature = "http-tools")]
pub use neo4j::{Neo4jAdapter, parse_graph_rows};
#[cfg(feature = "http-tools")]
pub use serper::{SerperAdapter, parse_organic_results};

/// A collaborator that answers sub-queries of one category.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    /// Category this adapter serves.
    fn category(&self) -> ToolCategory;

    /// Adapter name for logging.
    fn name(&self) -> &str;

    /// Fetches the raw payload for `sub_query`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on transport, status, or decoding failures.
    async fn fetch(&self, sub_query: &SubQuery) -> Result<Value, AgentError>;

    /// Runs [`fetch`](Self::fetch) under `policy` and records the outcome.
    async fn execute(&self, sub_query: &SubQuery, policy: &CallPolicy) -> ToolResult {
        let start = Instant::now();
        let outcome = policy.run(self.name(), || self.fetch(sub_query)).await;
        let elapsed = start.elapsed();
        match outcome {
            Ok(payload) => {
                debug!(tool = self.name(), ?elapsed, "tool call succeeded");
                ToolResult::success(sub_query, payload, elapsed)
            }
            Err(e) => {
                warn!(tool = self.name(), error = %e, "tool call failed");
                ToolResult::failure(sub_query, e.to_string(), elapsed)
            }
        }
    }
}

/// Adapter for a category whose collaborator is not configured.
#[derive(Debug, Clone)]
pub struct UnavailableAdapter {
    category: ToolCategory,
    reason: String,
}

impl UnavailableAdapter {
    /// Creates an adapter that fails every call with `reason`.
    #[must_use]
    pub fn new(category: ToolCategory, reason: impl Into<String>) -> Self {
        Self {
            category,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ToolAdapter for UnavailableAdapter {
    fn category(&self) -> ToolCategory {
        self.category
    }

    fn name(&self) -> &str {
        "unavailable"
    }

    async fn fetch(&self, _sub_query: &SubQuery) -> Result<Value, AgentError> {
        // Configuration errors are not retryable, so this fails on the first attempt.
        Err(AgentError::Configuration {
            message: format!("{} tool unavailable: {}", self.category, self.reason),
        })
    }
}
