//! Agent configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use super::policy::CallPolicy;
use crate::core::ToolCategory;
use crate::error::AgentError;

/// Default maximum concurrent tool calls per retrieve step.
const DEFAULT_MAX_CONCURRENCY: usize = 8;
/// Default ceiling on plan → retrieve → critic cycles.
const DEFAULT_MAX_ITERATIONS: u32 = 3;
/// Hard upper bound on sub-queries in one plan.
pub const MAX_SUB_QUERIES: usize = 5;
/// Default LLM call timeout in seconds.
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 30;
/// Default tool adapter timeout in seconds.
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 20;
/// Default persistence call timeout in seconds.
const DEFAULT_STORE_TIMEOUT_SECS: u64 = 5;
/// Default max retries.
const DEFAULT_MAX_RETRIES: u32 = 2;
/// Default base backoff between retries in milliseconds.
const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;
/// Default results requested from each search collaborator.
const DEFAULT_TOOL_TOP_K: usize = 5;
/// Default chat model for classification, planning, and critique.
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
/// Default model for report and simple responses.
const DEFAULT_REPORT_MODEL: &str = "gpt-4o";
/// Default embedding model.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// Default Elasticsearch index.
const DEFAULT_ELASTICSEARCH_INDEX: &str = "financial_documents";

/// Verdict the critic assumes when the judge's output cannot be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CriticFallback {
    /// Stop refining (availability over thoroughness).
    #[default]
    AssumeSufficient,
    /// Keep refining until the iteration ceiling.
    AssumeInsufficient,
}

impl CriticFallback {
    /// Parses `"sufficient"` / `"insufficient"` (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sufficient" | "assume_sufficient" => Some(Self::AssumeSufficient),
            "insufficient" | "assume_insufficient" => Some(Self::AssumeInsufficient),
            _ => None,
        }
    }

    /// The boolean verdict this fallback stands for.
    #[must_use]
    pub const fn sufficient(self) -> bool {
        matches!(self, Self::AssumeSufficient)
    }
}

/// Connection settings for the tool collaborators.
///
/// A collaborator left unset is served by an adapter that reports
/// every call as a failed result.
#[derive(Debug, Clone, Default)]
pub struct ToolsConfig {
    /// Elasticsearch base URL (document and news search).
    pub elasticsearch_url: Option<String>,
    /// Elasticsearch index holding documents and news.
    pub elasticsearch_index: String,
    /// Elasticsearch API key.
    pub elasticsearch_api_key: Option<String>,
    /// Neo4j HTTP endpoint base URL.
    pub neo4j_url: Option<String>,
    /// Neo4j user.
    pub neo4j_user: Option<String>,
    /// Neo4j password.
    pub neo4j_password: Option<String>,
    /// Serper API key (web search).
    pub serper_api_key: Option<String>,
    /// Results requested per search call.
    pub top_k: usize,
}

impl ToolsConfig {
    /// Reads collaborator settings from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            elasticsearch_url: var("ELASTICSEARCH_URL"),
            elasticsearch_index: var("ELASTICSEARCH_INDEX")
                .unwrap_or_else(|| DEFAULT_ELASTICSEARCH_INDEX.to_string()),
            elasticsearch_api_key: var("ELASTICSEARCH_API_KEY"),
            neo4j_url: var("NEO4J_HTTP_URL"),
            neo4j_user: var("NEO4J_USER"),
            neo4j_password: var("NEO4J_PASSWORD"),
            serper_api_key: var("SERPER_API_KEY"),
            top_k: var("INSIGHT_TOOL_TOP_K")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TOOL_TOP_K),
        }
    }
}

/// Configuration for the agent system.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LLM provider name (`"openai"` or `"offline"`).
    pub provider: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model for classification, planning, and critique.
    pub chat_model: String,
    /// Model for the report generator and simple responder.
    pub report_model: String,
    /// Embedding model.
    pub embedding_model: String,
    /// Maximum concurrent tool calls per retrieve step.
    pub max_concurrency: usize,
    /// Ceiling on plan → retrieve → critic cycles (at least 1).
    pub max_iterations: u32,
    /// Maximum sub-queries per plan (1..=5).
    pub max_sub_queries: usize,
    /// Per-call LLM timeout.
    pub llm_timeout: Duration,
    /// Per-call tool adapter timeout.
    pub tool_timeout: Duration,
    /// Per-call persistence timeout.
    pub store_timeout: Duration,
    /// Maximum retry attempts for retryable failures.
    pub max_retries: u32,
    /// Base delay between retries, doubled per attempt.
    pub retry_backoff: Duration,
    /// Verdict assumed when the critic cannot interpret the judge.
    pub critic_fallback: CriticFallback,
    /// Rewrite sub-queries into the phrasing each tool expects.
    pub rewrite_sub_queries: bool,
    /// Dispatch sub-queries concurrently (sequential when `false`).
    pub parallel_retrieval: bool,
    /// Category used when neither keywords nor the LLM pick one.
    pub default_category: ToolCategory,
    /// Directory containing prompt template files.
    ///
    /// Missing files fall back to compiled-in defaults.
    pub prompt_dir: Option<PathBuf>,
    /// Tool collaborator settings.
    pub tools: ToolsConfig,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Configuration`] on inconsistent settings.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }

    /// Timeout/retry policy for LLM calls.
    #[must_use]
    pub const fn llm_policy(&self) -> CallPolicy {
        CallPolicy::new(self.llm_timeout, self.max_retries, self.retry_backoff)
    }

    /// Timeout/retry policy for tool adapter calls.
    #[must_use]
    pub const fn tool_policy(&self) -> CallPolicy {
        CallPolicy::new(self.tool_timeout, self.max_retries, self.retry_backoff)
    }

    /// Timeout policy for persistence calls (never retried).
    #[must_use]
    pub const fn store_policy(&self) -> CallPolicy {
        CallPolicy::new(self.store_timeout, 0, self.retry_backoff)
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    chat_model: Option<String>,
    report_model: Option<String>,
    embedding_model: Option<String>,
    max_concurrency: Option<usize>,
    max_iterations: Option<u32>,
    max_sub_queries: Option<usize>,
    llm_timeout: Option<Duration>,
    tool_timeout: Option<Duration>,
    store_timeout: Option<Duration>,
    max_retries: Option<u32>,
    retry_backoff: Option<Duration>,
    critic_fallback: Option<CriticFallback>,
    rewrite_sub_queries: Option<bool>,
    parallel_retrieval: Option<bool>,
    default_category: Option<ToolCategory>,
    prompt_dir: Option<PathBuf>,
    tools: Option<ToolsConfig>,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("INSIGHT_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("INSIGHT_API_KEY"))
                .ok()
                .filter(|k| !k.is_empty());
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("INSIGHT_BASE_URL"))
                .ok();
        }
        if self.chat_model.is_none() {
            self.chat_model = std::env::var("INSIGHT_CHAT_MODEL").ok();
        }
        if self.report_model.is_none() {
            self.report_model = std::env::var("INSIGHT_REPORT_MODEL").ok();
        }
        if self.embedding_model.is_none() {
            self.embedding_model = std::env::var("INSIGHT_EMBEDDING_MODEL").ok();
        }
        if self.max_concurrency.is_none() {
            self.max_concurrency = env_parse("INSIGHT_MAX_CONCURRENCY");
        }
        if self.max_iterations.is_none() {
            self.max_iterations = env_parse("INSIGHT_MAX_ITERATIONS");
        }
        if self.max_sub_queries.is_none() {
            self.max_sub_queries = env_parse("INSIGHT_MAX_SUB_QUERIES");
        }
        if self.llm_timeout.is_none() {
            self.llm_timeout = env_parse("INSIGHT_LLM_TIMEOUT_SECS").map(Duration::from_secs);
        }
        if self.tool_timeout.is_none() {
            self.tool_timeout = env_parse("INSIGHT_TOOL_TIMEOUT_SECS").map(Duration::from_secs);
        }
        if self.store_timeout.is_none() {
            self.store_timeout = env_parse("INSIGHT_STORE_TIMEOUT_SECS").map(Duration::from_secs);
        }
        if self.max_retries.is_none() {
            self.max_retries = env_parse("INSIGHT_MAX_RETRIES");
        }
        if self.critic_fallback.is_none() {
            self.critic_fallback = std::env::var("INSIGHT_CRITIC_FALLBACK")
                .ok()
                .and_then(|v| CriticFallback::parse(&v));
        }
        if self.rewrite_sub_queries.is_none() {
            self.rewrite_sub_queries = env_parse("INSIGHT_REWRITE_QUERIES");
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("INSIGHT_PROMPT_DIR").ok().map(PathBuf::from);
        }
        if self.tools.is_none() {
            self.tools = Some(ToolsConfig::from_env());
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the chat model.
    #[must_use]
    pub fn chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = Some(model.into());
        self
    }

    /// Sets the report model.
    #[must_use]
    pub fn report_model(mut self, model: impl Into<String>) -> Self {
        self.report_model = Some(model.into());
        self
    }

    /// Sets the maximum concurrency.
    #[must_use]
    pub const fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    /// Sets the iteration ceiling.
    #[must_use]
    pub const fn max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Sets the maximum sub-queries per plan.
    #[must_use]
    pub const fn max_sub_queries(mut self, n: usize) -> Self {
        self.max_sub_queries = Some(n);
        self
    }

    /// Sets the LLM call timeout.
    #[must_use]
    pub const fn llm_timeout(mut self, duration: Duration) -> Self {
        self.llm_timeout = Some(duration);
        self
    }

    /// Sets the tool call timeout.
    #[must_use]
    pub const fn tool_timeout(mut self, duration: Duration) -> Self {
        self.tool_timeout = Some(duration);
        self
    }

    /// Sets the max retries.
    #[must_use]
    pub const fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Sets the base retry backoff.
    #[must_use]
    pub const fn retry_backoff(mut self, delay: Duration) -> Self {
        self.retry_backoff = Some(delay);
        self
    }

    /// Sets the critic parse-failure fallback.
    #[must_use]
    pub const fn critic_fallback(mut self, fallback: CriticFallback) -> Self {
        self.critic_fallback = Some(fallback);
        self
    }

    /// Enables or disables sub-query rewriting.
    #[must_use]
    pub const fn rewrite_sub_queries(mut self, enabled: bool) -> Self {
        self.rewrite_sub_queries = Some(enabled);
        self
    }

    /// Enables or disables concurrent retrieval.
    #[must_use]
    pub const fn parallel_retrieval(mut self, enabled: bool) -> Self {
        self.parallel_retrieval = Some(enabled);
        self
    }

    /// Sets the default tool category.
    #[must_use]
    pub const fn default_category(mut self, category: ToolCategory) -> Self {
        self.default_category = Some(category);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Sets the tool collaborator settings.
    #[must_use]
    pub fn tools(mut self, tools: ToolsConfig) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// Without an explicit provider, `"openai"` is chosen when an API key
    /// is present and `"offline"` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Configuration`] if `"openai"` is requested
    /// without an API key or the concurrency limit is zero.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let provider = self.provider.unwrap_or_else(|| {
            if self.api_key.is_some() {
                "openai".to_string()
            } else {
                "offline".to_string()
            }
        });

        if provider == "openai" && self.api_key.is_none() {
            return Err(AgentError::Configuration {
                message: "provider 'openai' requires OPENAI_API_KEY".to_string(),
            });
        }

        let max_concurrency = self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY);
        if max_concurrency == 0 {
            return Err(AgentError::Configuration {
                message: "max_concurrency must be at least 1".to_string(),
            });
        }

        Ok(AgentConfig {
            provider,
            api_key: self.api_key,
            base_url: self.base_url,
            chat_model: self
                .chat_model
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            report_model: self
                .report_model
                .unwrap_or_else(|| DEFAULT_REPORT_MODEL.to_string()),
            embedding_model: self
                .embedding_model
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            max_concurrency,
            max_iterations: self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS).max(1),
            max_sub_queries: self
                .max_sub_queries
                .unwrap_or(MAX_SUB_QUERIES)
                .clamp(1, MAX_SUB_QUERIES),
            llm_timeout: self
                .llm_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS)),
            tool_timeout: self
                .tool_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS)),
            store_timeout: self
                .store_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS)),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_backoff: self
                .retry_backoff
                .unwrap_or(Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS)),
            critic_fallback: self.critic_fallback.unwrap_or_default(),
            rewrite_sub_queries: self.rewrite_sub_queries.unwrap_or(true),
            parallel_retrieval: self.parallel_retrieval.unwrap_or(true),
            default_category: self.default_category.unwrap_or(ToolCategory::Web),
            prompt_dir: self.prompt_dir,
            tools: self.tools.unwrap_or_else(|| ToolsConfig {
                elasticsearch_index: DEFAULT_ELASTICSEARCH_INDEX.to_string(),
                top_k: DEFAULT_TOOL_TOP_K,
                ..ToolsConfig::default()
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_offline_without_key() {
        let config = AgentConfig::builder()
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "offline");
        assert!(config.api_key.is_none());
        assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert_eq!(config.max_sub_queries, MAX_SUB_QUERIES);
        assert_eq!(config.critic_fallback, CriticFallback::AssumeSufficient);
        assert_eq!(config.default_category, ToolCategory::Web);
        assert_eq!(config.tools.elasticsearch_index, DEFAULT_ELASTICSEARCH_INDEX);
    }

    #[test]
    fn test_builder_openai_with_key() {
        let config = AgentConfig::builder()
            .api_key("test-key")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "openai");
        assert_eq!(config.chat_model, DEFAULT_CHAT_MODEL);
    }

    #[test]
    fn test_builder_openai_requires_key() {
        let result = AgentConfig::builder().provider("openai").build();
        assert!(matches!(result, Err(AgentError::Configuration { .. })));
    }

    #[test]
    fn test_builder_clamps_limits() {
        let config = AgentConfig::builder()
            .max_iterations(0)
            .max_sub_queries(12)
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.max_iterations, 1);
        assert_eq!(config.max_sub_queries, MAX_SUB_QUERIES);

        let config = AgentConfig::builder()
            .max_sub_queries(0)
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.max_sub_queries, 1);
    }

    #[test]
    fn test_builder_rejects_zero_concurrency() {
        assert!(AgentConfig::builder().max_concurrency(0).build().is_err());
    }

    #[test]
    fn test_critic_fallback_parse() {
        assert_eq!(
            CriticFallback::parse("Insufficient"),
            Some(CriticFallback::AssumeInsufficient)
        );
        assert_eq!(
            CriticFallback::parse("sufficient"),
            Some(CriticFallback::AssumeSufficient)
        );
        assert_eq!(CriticFallback::parse("maybe"), None);
        assert!(CriticFallback::AssumeSufficient.sufficient());
    }

    #[test]
    fn test_policies_follow_config() {
        let config = AgentConfig::builder()
            .llm_timeout(Duration::from_secs(7))
            .max_retries(4)
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.llm_policy().timeout, Duration::from_secs(7));
        assert_eq!(config.llm_policy().max_retries, 4);
        assert_eq!(config.store_policy().max_retries, 0);
    }
}
