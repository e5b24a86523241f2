//! Records held by the memory and insight stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stated investment profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Owner.
    pub user_id: String,
    /// e.g. `"conservative"`, `"moderate"`, `"aggressive"`.
    pub risk_tolerance: Option<String>,
    /// e.g. `"long-term growth"`.
    pub investment_goal: Option<String>,
    /// e.g. `"beginner"`.
    pub experience_level: Option<String>,
    /// Sectors the user prefers.
    #[serde(default)]
    pub preferred_sectors: Vec<String>,
}

/// A position in the user's portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    /// Ticker or company code.
    pub symbol: String,
    /// Display name.
    pub name: String,
    /// Units held.
    pub quantity: f64,
    /// Average purchase price.
    pub avg_price: Option<f64>,
}

/// Who sent a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The user.
    User,
    /// The assistant.
    Assistant,
}

impl MessageRole {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parses a stored role; anything but `"assistant"` is the user.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("assistant") {
            Self::Assistant
        } else {
            Self::User
        }
    }
}

/// A message to persist in conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Owner.
    pub user_id: String,
    /// Conversation.
    pub session_id: String,
    /// Sender.
    pub role: MessageRole,
    /// Text.
    pub content: String,
    /// Entities detected in the text.
    #[serde(default)]
    pub entities: Vec<String>,
    /// Classified intent (`"simple"`/`"complex"`).
    pub intent: Option<String>,
}

/// A persisted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Row id.
    pub id: i64,
    /// Message fields.
    #[serde(flatten)]
    pub message: NewMessage,
    /// Insert time.
    pub created_at: DateTime<Utc>,
}

/// How often an entity appeared in the user's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCount {
    /// Entity name.
    pub name: String,
    /// Mentions.
    pub count: usize,
}

/// Report content to persist as an insight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInsight {
    /// Owner.
    pub user_id: String,
    /// Question that produced the report.
    pub query: String,
    /// Report text.
    pub content: String,
    /// Entities the report is about.
    #[serde(default)]
    pub entities: Vec<String>,
    /// Free-form run metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Embedding of the content, when one could be computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// A persisted insight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// Row id.
    pub id: i64,
    /// Owner.
    pub user_id: String,
    /// Derived title.
    pub title: String,
    /// Derived summary.
    pub summary: String,
    /// Derived classification (e.g. `"financial"`).
    pub insight_type: String,
    /// Derived tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Question that produced it.
    pub query: String,
    /// Full report text.
    pub content: String,
    /// Entities the report is about.
    #[serde(default)]
    pub entities: Vec<String>,
    /// Insert time.
    pub created_at: DateTime<Utc>,
    /// Search similarity, set only by search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// Everything known about a user when a request starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    /// Owner.
    pub user_id: String,
    /// Stated profile.
    pub profile: Option<UserProfile>,
    /// Portfolio.
    #[serde(default)]
    pub holdings: Vec<Holding>,
    /// Declared interests.
    #[serde(default)]
    pub interests: Vec<String>,
    /// Latest messages, newest first.
    #[serde(default)]
    pub recent_messages: Vec<StoredMessage>,
    /// Most mentioned entities.
    #[serde(default)]
    pub frequent_entities: Vec<EntityCount>,
    /// Related past insights.
    #[serde(default)]
    pub recent_insights: Vec<Insight>,
    /// One-line description.
    pub summary: String,
}

impl UserContext {
    /// Context for a user the stores know nothing about.
    #[must_use]
    pub fn anonymous(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            summary: "new user with no stored profile".to_string(),
            ..Self::default()
        }
    }
}
