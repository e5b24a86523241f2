//! Agent trait definition.
//!
//! All LLM-backed roles (classifier, planner, critic, reporter, responder)
//! implement this trait, which gives the orchestrator one way to call a
//! provider under the configured timeout/retry policy.

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse, TokenUsage, system_message, user_message};
use super::policy::CallPolicy;
use super::provider::LlmProvider;
use crate::error::AgentError;

/// Response from an agent execution.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// The agent's text output.
    pub content: String,
    /// Token usage for this call.
    pub usage: TokenUsage,
    /// Why the model stopped generating (e.g. `"stop"`, `"length"`).
    pub finish_reason: Option<String>,
}

/// Trait implemented by all agents in the system.
///
/// Agents encapsulate a specific role with a fixed system prompt and
/// model configuration. Callers use [`Agent::execute`] and apply the
/// agent's own fallback when it returns an error.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name for logging and identification.
    fn name(&self) -> &'static str;

    /// Model identifier to use for this agent.
    fn model(&self) -> &str;

    /// System prompt that defines the agent's role and behavior.
    fn system_prompt(&self) -> &str;

    /// Whether to request JSON-formatted output.
    fn json_mode(&self) -> bool {
        false
    }

    /// Sampling temperature (0.0 = deterministic, higher = more creative).
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Maximum tokens for the response.
    fn max_tokens(&self) -> u32 {
        1024
    }

    /// Builds the provider request for `user_msg`.
    fn request(&self, user_msg: &str) -> ChatRequest {
        ChatRequest {
            agent: self.name(),
            model: self.model().to_string(),
            messages: vec![system_message(self.system_prompt()), user_message(user_msg)],
            temperature: Some(self.temperature()),
            max_tokens: Some(self.max_tokens()),
            json_mode: self.json_mode(),
        }
    }

    /// Executes the agent with the given user message.
    ///
    /// The provider call runs under `policy`, so a hung provider costs
    /// at most the configured timeout per attempt.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on API failures, timeouts, or empty output.
    async fn execute(
        &self,
        provider: &dyn LlmProvider,
        policy: &CallPolicy,
        user_msg: &str,
    ) -> Result<AgentResponse, AgentError> {
        let request = self.request(user_msg);

        let response: ChatResponse = policy
            .run(self.name(), || provider.chat(&request))
            .await?;

        if response.content.trim().is_empty() {
            return Err(AgentError::ResponseParse {
                message: format!("{} returned an empty response", self.name()),
                content: response.content,
            });
        }

        Ok(AgentResponse {
            content: response.content,
            usage: response.usage,
            finish_reason: response.finish_reason,
        })
    }
}
