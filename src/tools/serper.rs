//! Serper Google search for open-web evidence.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::ToolAdapter;
use super::http::{client, send_json};
use crate::agent::SubQuery;
use crate::core::ToolCategory;
use crate::error::AgentError;

/// Serper search endpoint.
const SERPER_URL: &str = "https://google.serper.dev/search";

/// Web search through the Serper API.
pub struct SerperAdapter {
    client: reqwest::Client,
    api_key: String,
    top_k: usize,
}

impl SerperAdapter {
    /// Creates an adapter authenticated with `api_key`.
    #[must_use]
    pub fn new(api_key: &str, top_k: usize) -> Self {
        Self {
            client: client(),
            api_key: api_key.to_string(),
            top_k: top_k.max(1),
        }
    }
}

#[async_trait]
impl ToolAdapter for SerperAdapter {
    fn category(&self) -> ToolCategory {
        ToolCategory::Web
    }

    fn name(&self) -> &str {
        "serper"
    }

    async fn fetch(&self, sub_query: &SubQuery) -> Result<Value, AgentError> {
        let request = self
            .client
            .post(SERPER_URL)
            .header("X-API-KEY", &self.api_key)
            .json(&json!({"q": sub_query.text, "num": self.top_k}));
        let raw = send_json(self.name(), request).await?;
        let mut results = parse_organic_results(&raw);
        results.truncate(self.top_k);
        let mut payload = json!({
            "query": sub_query.text,
            "results": results,
        });
        if let Some(answer) = raw
            .pointer("/answerBox/answer")
            .or_else(|| raw.pointer("/answerBox/snippet"))
        {
            payload["answer"] = answer.clone();
        }
        Ok(payload)
    }
}

/// Maps Serper `organic[]` entries to `{title, snippet, url}` records.
#[must_use]
pub fn parse_organic_results(raw: &Value) -> Vec<Value> {
    raw.get("organic")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    let text = |k: &str| item.get(k).and_then(Value::as_str).unwrap_or("");
                    json!({
                        "title": text("title"),
                        "snippet": text("snippet"),
                        "url": text("link"),
                        "date": item.get("date").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
