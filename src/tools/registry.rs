//! Category to adapter lookup.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use super::{ToolAdapter, UnavailableAdapter};
use crate::agent::ToolsConfig;
use crate::core::ToolCategory;

/// One adapter per [`ToolCategory`].
///
/// Every category always resolves: missing entries are served by an
/// [`UnavailableAdapter`].
#[derive(Clone, Default)]
pub struct ToolRegistry {
    adapters: BTreeMap<ToolCategory, Arc<dyn ToolAdapter>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `adapter` under its own category, replacing any previous one.
    #[must_use]
    pub fn with(mut self, adapter: Arc<dyn ToolAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Registers `adapter` under its own category, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn ToolAdapter>) {
        self.adapters.insert(adapter.category(), adapter);
    }

    /// Adapter for `category`.
    #[must_use]
    pub fn get(&self, category: ToolCategory) -> Arc<dyn ToolAdapter> {
        self.adapters.get(&category).map_or_else(
            || {
                Arc::new(UnavailableAdapter::new(category, "no adapter registered"))
                    as Arc<dyn ToolAdapter>
            },
            Arc::clone,
        )
    }

    /// Names of the registered adapters per category.
    #[must_use]
    pub fn describe(&self) -> Vec<(ToolCategory, String)> {
        ToolCategory::ALL
            .into_iter()
            .map(|c| (c, self.get(c).name().to_string()))
            .collect()
    }

    /// Builds adapters for every configured collaborator.
    #[must_use]
    #[cfg_attr(not(feature = "http-tools"), allow(unused_variables))]
    pub fn from_config(tools: &ToolsConfig) -> Self {
        let mut registry = Self::new();

        #[cfg(feature = "http-tools")]
        {
            use super::{ElasticsearchAdapter, Neo4jAdapter, SerperAdapter};

            if let Some(url) = &tools.elasticsearch_url {
                for category in [ToolCategory::Document, ToolCategory::News] {
                    registry.register(Arc::new(ElasticsearchAdapter::new(
                        category,
                        url,
                        &tools.elasticsearch_index,
                        tools.elasticsearch_api_key.clone(),
                        tools.top_k,
                    )));
                }
            }
            if let Some(url) = &tools.neo4j_url {
                registry.register(Arc::new(Neo4jAdapter::new(
                    url,
                    tools.neo4j_user.clone(),
                    tools.neo4j_password.clone(),
                )));
            }
            if let Some(key) = &tools.serper_api_key {
                registry.register(Arc::new(SerperAdapter::new(key, tools.top_k)));
            }
        }

        for category in ToolCategory::ALL {
            if !registry.adapters.contains_key(&category) {
                let reason = missing_reason(category);
                info!(%category, reason, "tool collaborator not configured");
                registry.register(Arc::new(UnavailableAdapter::new(category, reason)));
            }
        }
        registry
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.adapters.iter().map(|(c, a)| (c, a.name())))
            .finish()
    }
}

const fn missing_reason(category: ToolCategory) -> &'static str {
    if cfg!(not(feature = "http-tools")) {
        return "built without the http-tools feature";
    }
    match category {
        ToolCategory::Document | ToolCategory::News => "ELASTICSEARCH_URL not set",
        ToolCategory::Graph => "NEO4J_HTTP_URL not set",
        ToolCategory::Web => "SERPER_API_KEY not set",
    }
}
