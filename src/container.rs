//! Process-wide collaborator handles.
//!
//! Built once at startup and handed to the
//! [`Orchestrator`](crate::agent::Orchestrator). Every handle is shared
//! across requests and safe for concurrent use.

use std::fmt;
use std::sync::Arc;

use crate::agent::{AgentConfig, LlmProvider, create_provider};
use crate::error::AgentError;
use crate::storage::{InsightStore, MemoryStore, SqliteStore};
use crate::tools::ToolRegistry;

/// Collaborators the workflow depends on.
#[derive(Clone)]
pub struct Container {
    /// Chat and embedding backend.
    pub provider: Arc<dyn LlmProvider>,
    /// One adapter per tool category.
    pub tools: ToolRegistry,
    /// User profiles and conversation history.
    pub memory: Arc<dyn MemoryStore>,
    /// Persisted reports.
    pub insights: Arc<dyn InsightStore>,
}

impl Container {
    /// Assembles a container from explicit handles.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: ToolRegistry,
        memory: Arc<dyn MemoryStore>,
        insights: Arc<dyn InsightStore>,
    ) -> Self {
        Self {
            provider,
            tools,
            memory,
            insights,
        }
    }

    /// Builds the provider and tool adapters from `config`; both stores
    /// are served by `store`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::UnsupportedProvider`] when the configured
    /// provider is unknown or not compiled in.
    pub fn from_config(config: &AgentConfig, store: SqliteStore) -> Result<Self, AgentError> {
        let provider = create_provider(config)?;
        let tools = ToolRegistry::from_config(&config.tools);
        Ok(Self::new(
            provider,
            tools,
            Arc::new(store.clone()),
            Arc::new(store),
        ))
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("provider", &self.provider.name())
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolCategory;

    #[test]
    fn test_from_config_offline() {
        let config = AgentConfig::builder()
            .provider("offline")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let store = SqliteStore::in_memory().unwrap_or_else(|_| unreachable!());
        let container = Container::from_config(&config, store).unwrap_or_else(|_| unreachable!());
        assert_eq!(container.provider.name(), "offline");
        assert_eq!(container.tools.describe().len(), ToolCategory::ALL.len());
    }

    #[test]
    fn test_from_config_rejects_unknown_provider() {
        let config = AgentConfig::builder()
            .provider("nope")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let store = SqliteStore::in_memory().unwrap_or_else(|_| unreachable!());
        assert!(Container::from_config(&config, store).is_err());
    }
}
