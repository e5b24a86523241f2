//! Provider registry and factory.
//!
//! Maps provider names to concrete [`LlmProvider`] implementations.

use std::sync::Arc;

use crate::agent::config::AgentConfig;
use crate::agent::provider::LlmProvider;
#[cfg(feature = "openai")]
use crate::agent::providers::OpenAiProvider;
use crate::agent::providers::OfflineProvider;
use crate::error::AgentError;

/// Creates an [`LlmProvider`] based on the configured provider name.
///
/// # Supported Providers
///
/// - `"openai"`: OpenAI-compatible APIs via `async-openai` (feature `openai`)
/// - `"offline"`: no model; agents fall back to their heuristics
///
/// # Errors
///
/// Returns [`AgentError::UnsupportedProvider`] for unknown provider names,
/// or for `"openai"` when the crate was built without the `openai` feature.
pub fn create_provider(config: &AgentConfig) -> Result<Arc<dyn LlmProvider>, AgentError> {
    match config.provider.as_str() {
        #[cfg(feature = "openai")]
        "openai" => Ok(Arc::new(OpenAiProvider::new(config))),
        "offline" => Ok(Arc::new(OfflineProvider)),
        other => Err(AgentError::UnsupportedProvider {
            name: other.to_string(),
        }),
    }
}
