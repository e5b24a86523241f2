//! Neo4j relationship lookup over the HTTP transaction endpoint.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::ToolAdapter;
use super::http::{client, send_json};
use crate::agent::SubQuery;
use crate::core::{ToolCategory, extract_entities};
use crate::error::AgentError;

/// One-hop neighbourhood of a named entity.
const NEIGHBOURHOOD_CYPHER: &str = "MATCH (center:Entity {name: $name})-[r]-(neighbor:Entity) \
     RETURN center.name AS source, type(r) AS relationship, neighbor.name AS target LIMIT 20";

/// Looks up the relationship graph around entities named in a sub-query.
pub struct Neo4jAdapter {
    client: reqwest::Client,
    commit_url: String,
    user: Option<String>,
    password: Option<String>,
}

impl Neo4jAdapter {
    /// Creates an adapter for the Neo4j HTTP endpoint at `base_url`.
    #[must_use]
    pub fn new(base_url: &str, user: Option<String>, password: Option<String>) -> Self {
        Self {
            client: client(),
            commit_url: format!("{}/db/neo4j/tx/commit", base_url.trim_end_matches('/')),
            user,
            password,
        }
    }

    fn statements(names: &[String]) -> Value {
        let statements: Vec<Value> = names
            .iter()
            .map(|name| {
                json!({
                    "statement": NEIGHBOURHOOD_CYPHER,
                    "parameters": {"name": name},
                })
            })
            .collect();
        json!({ "statements": statements })
    }
}

#[async_trait]
impl ToolAdapter for Neo4jAdapter {
    fn category(&self) -> ToolCategory {
        ToolCategory::Graph
    }

    fn name(&self) -> &str {
        "neo4j"
    }

    async fn fetch(&self, sub_query: &SubQuery) -> Result<Value, AgentError> {
        let mut names = extract_entities(&sub_query.text);
        if names.is_empty() {
            names = extract_entities(&sub_query.source);
        }
        if names.is_empty() {
            return Ok(json!({
                "query": sub_query.text,
                "entities": [],
                "relationships": [],
            }));
        }

        let mut request = self
            .client
            .post(&self.commit_url)
            .json(&Self::statements(&names));
        if let Some(user) = &self.user {
            request = request.basic_auth(user, self.password.as_deref());
        }
        let raw = send_json(self.name(), request).await?;

        if let Some(message) = raw.pointer("/errors/0/message").and_then(Value::as_str) {
            return Err(AgentError::ToolExecution {
                tool: self.name().to_string(),
                message: message.to_string(),
            });
        }

        let (entities, relationships) = parse_graph_rows(&raw);
        Ok(json!({
            "query": sub_query.text,
            "entities": entities,
            "relationships": relationships,
        }))
    }
}

/// Collects deduplicated entities and relationships from transaction rows.
///
/// Each row is `[source, relationship, target]`. Entities are keyed by
/// name and relationships by `source-relationship-target`.
#[must_use]
pub fn parse_graph_rows(raw: &Value) -> (Vec<Value>, Vec<Value>) {
    let mut seen_entities = HashSet::new();
    let mut seen_relationships = HashSet::new();
    let mut entities = Vec::new();
    let mut relationships = Vec::new();

    let rows = raw
        .get("results")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|result| result.get("data").and_then(Value::as_array))
        .flatten()
        .filter_map(|datum| datum.get("row").and_then(Value::as_array));

    for row in rows {
        let [source, relationship, target] = [0, 1, 2].map(|i| row.get(i).and_then(Value::as_str));
        let (Some(source), Some(relationship), Some(target)) = (source, relationship, target)
        else {
            continue;
        };
        for name in [source, target] {
            if seen_entities.insert(name.to_string()) {
                entities.push(json!({"name": name, "type": "entity"}));
            }
        }
        if seen_relationships.insert(format!("{source}-{relationship}-{target}")) {
            relationships.push(json!({
                "source": source,
                "relationship": relationship,
                "target": target,
            }));
        }
    }
    (entities, relationships)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_graph_rows_dedupes() {
        let raw = json!({"results": [
            {"columns": ["source", "relationship", "target"], "data": [
                {"row": ["삼성전자", "COMPETES_WITH", "SK하이닉스"]},
                {"row": ["삼성전자", "SUPPLIES", "애플"]},
                {"row": ["삼성전자", "COMPETES_WITH", "SK하이닉스"]}
            ]},
            {"columns": ["source", "relationship", "target"], "data": [
                {"row": ["SK하이닉스", "COMPETES_WITH", "삼성전자"]},
                {"row": ["broken"]}
            ]}
        ], "errors": []});
        let (entities, relationships) = parse_graph_rows(&raw);
        let names: Vec<&str> = entities.iter().filter_map(|e| e["name"].as_str()).collect();
        assert_eq!(names, vec!["삼성전자", "SK하이닉스", "애플"]);
        assert_eq!(relationships.len(), 3);
    }

    #[test]
    fn test_statements_one_per_entity() {
        let body = Neo4jAdapter::statements(&["삼성전자".to_string(), "반도체".to_string()]);
        let statements = body["statements"].as_array().cloned().unwrap_or_default();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1]["parameters"]["name"], "반도체");
        let adapter = Neo4jAdapter::new("http://neo4j:7474/", None, None);
        assert_eq!(adapter.commit_url, "http://neo4j:7474/db/neo4j/tx/commit");
    }

    #[tokio::test]
    async fn test_no_entities_short_circuits() {
        let adapter = Neo4jAdapter::new("http://127.0.0.1:1", None, None);
        let sq = SubQuery {
            text: "what is going on".to_string(),
            category: ToolCategory::Graph,
            source: "what is going on".to_string(),
            priority: 3.0,
        };
        let payload = adapter.fetch(&sq).await.unwrap_or_default();
        assert_eq!(payload["relationships"], json!([]));
    }
}
