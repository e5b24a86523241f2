//! Elasticsearch text search for financial documents and news.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::ToolAdapter;
use super::http::{client, send_json};
use crate::agent::SubQuery;
use crate::core::ToolCategory;
use crate::error::AgentError;

/// Document `type` value that marks news articles in the index.
const NEWS_TYPE: &str = "news";

/// Searches one Elasticsearch index, restricted to news or to everything else.
pub struct ElasticsearchAdapter {
    category: ToolCategory,
    client: reqwest::Client,
    search_url: String,
    api_key: Option<String>,
    top_k: usize,
}

impl ElasticsearchAdapter {
    /// Creates an adapter for `category` (`Document` or `News`).
    #[must_use]
    pub fn new(
        category: ToolCategory,
        base_url: &str,
        index: &str,
        api_key: Option<String>,
        top_k: usize,
    ) -> Self {
        Self {
            category,
            client: client(),
            search_url: format!("{}/{index}/_search", base_url.trim_end_matches('/')),
            api_key,
            top_k: top_k.max(1),
        }
    }

    /// Weighted multi-field match, filtered by document type.
    fn body(&self, text: &str) -> Value {
        let mut body = json!({
            "size": self.top_k,
            "query": {
                "bool": {
                    "should": [
                        {"match": {"content": {"query": text, "boost": 2.0}}},
                        {"match": {"corp_name": {"query": text, "boost": 1.5}}},
                        {"match": {"report_name": {"query": text, "boost": 1.0}}}
                    ],
                    "minimum_should_match": 1
                }
            }
        });
        let filter = json!([{"term": {"type": NEWS_TYPE}}]);
        let clause = if self.category == ToolCategory::News {
            "must"
        } else {
            "must_not"
        };
        body["query"]["bool"][clause] = filter;
        body
    }
}

#[async_trait]
impl ToolAdapter for ElasticsearchAdapter {
    fn category(&self) -> ToolCategory {
        self.category
    }

    fn name(&self) -> &str {
        "elasticsearch"
    }

    async fn fetch(&self, sub_query: &SubQuery) -> Result<Value, AgentError> {
        let mut request = self
            .client
            .post(&self.search_url)
            .json(&self.body(&sub_query.text));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("ApiKey {key}"));
        }
        let raw = send_json(self.name(), request).await?;
        Ok(json!({
            "query": sub_query.text,
            "documents": parse_search_hits(&raw),
        }))
    }
}

/// Flattens `hits.hits[]._source` into document records.
#[must_use]
pub fn parse_search_hits(raw: &Value) -> Vec<Value> {
    raw.pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .map(|hit| {
                    let source = hit.get("_source").cloned().unwrap_or(Value::Null);
                    let field = |k: &str| source.get(k).cloned().unwrap_or(Value::Null);
                    json!({
                        "id": hit.get("_id").cloned().unwrap_or(Value::Null),
                        "score": hit.get("_score").cloned().unwrap_or(Value::Null),
                        "type": field("type"),
                        "corp_name": field("corp_name"),
                        "report_name": field("report_name"),
                        "content": field("content"),
                        "rcept_dt": field("rcept_dt"),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
