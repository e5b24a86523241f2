//! Shared HTTP plumbing for the collaborator adapters.

use serde_json::Value;

use crate::error::AgentError;

/// User agent sent to every collaborator.
const USER_AGENT: &str = concat!("insight-rs/", env!("CARGO_PKG_VERSION"));

/// Builds the client used by one adapter.
///
/// Per-call deadlines come from the call policy, so the client itself
/// carries no timeout.
pub(super) fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Sends `request` and decodes a JSON body, mapping failures by status.
///
/// Server errors and throttling stay retryable; other non-success
/// statuses do not.
pub(super) async fn send_json(
    tool: &str,
    request: reqwest::RequestBuilder,
) -> Result<Value, AgentError> {
    let response = request.send().await.map_err(|e| AgentError::ToolExecution {
        tool: tool.to_string(),
        message: format!("request failed: {e}"),
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AgentError::ApiRequest {
            message: format!("{tool} returned {}: {}", status.as_u16(), body.trim()),
            status: Some(status.as_u16()),
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| AgentError::ResponseParse {
            message: format!("{tool} response is not JSON: {e}"),
            content: String::new(),
        })
}
