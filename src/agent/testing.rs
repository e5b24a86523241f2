//! Scripted provider shared by agent unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse};
use super::provider::LlmProvider;
use crate::error::AgentError;

/// Replays queued replies per agent name and records every request.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<HashMap<&'static str, VecDeque<String>>>,
    calls: Mutex<Vec<(&'static str, String)>>,
}

impl ScriptedProvider {
    /// Queues `reply` for the next call from `agent`.
    pub fn reply(self, agent: &'static str, reply: &str) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.entry(agent).or_default().push_back(reply.to_string());
        }
        self
    }

    /// Number of calls made by `agent`.
    pub fn calls_for(&self, agent: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|(a, _)| *a == agent).count())
            .unwrap_or_default()
    }

    /// User messages sent by `agent`, in order.
    pub fn prompts_for(&self, agent: &str) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| {
                calls
                    .iter()
                    .filter(|(a, _)| *a == agent)
                    .map(|(_, p)| p.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((request.agent, request.last_user_content().to_string()));
        }
        let next = self
            .replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.get_mut(request.agent)?.pop_front());
        next.map(ChatResponse::text)
            .ok_or_else(|| AgentError::ProviderUnavailable {
                name: "scripted".to_string(),
            })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AgentError> {
        Ok(vec![text.chars().count() as f32, 1.0])
    }
}
