//! Persistence for user memory and generated insights.
//!
//! Two collaborator interfaces sit at this seam: [`MemoryStore`] holds
//! profiles, portfolios, and conversation history; [`InsightStore`] keeps
//! finished reports for later retrieval. [`SqliteStore`] implements both
//! over a single `rusqlite` database.

mod insight;
mod models;
mod sqlite;

use async_trait::async_trait;

use crate::error::StorageError;

pub use insight::{classify_insight_type, cosine_similarity, derive_summary, derive_title};
pub use models::{
    EntityCount, Holding, Insight, MessageRole, NewInsight, NewMessage, StoredMessage,
    UserContext, UserProfile,
};
pub use sqlite::SqliteStore;

/// User memory: profile, portfolio, interests, and conversation history.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Assembles everything known about `user_id`.
    ///
    /// History is restricted to `session_id` when given. A user with no
    /// stored data yields [`UserContext::anonymous`].
    async fn get_user_context(
        &self,
        user_id: &str,
        session_id: Option<&str>,
    ) -> Result<UserContext, StorageError>;

    /// Appends a message to conversation history and returns its id.
    async fn save_message(&self, message: NewMessage) -> Result<i64, StorageError>;

    /// Latest messages, newest first.
    async fn history(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StorageError>;

    /// Creates or updates a profile; unset fields keep their stored value.
    async fn upsert_profile(&self, profile: UserProfile) -> Result<(), StorageError>;

    /// Stored profile, if any.
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StorageError>;

    /// Adds a holding, replacing an existing one with the same symbol.
    async fn add_holding(&self, user_id: &str, holding: Holding) -> Result<(), StorageError>;

    /// Records an interest; duplicates are ignored.
    async fn add_interest(&self, user_id: &str, name: &str) -> Result<(), StorageError>;
}

/// Persisted reports.
#[async_trait]
pub trait InsightStore: Send + Sync {
    /// Stores a report with derived title, summary, tags, and type.
    async fn store(&self, insight: NewInsight) -> Result<i64, StorageError>;

    /// A user's insights ranked by similarity to `query`.
    ///
    /// Uses cosine similarity when both sides carry an embedding of the
    /// same dimension, keyword overlap otherwise. Zero scores are dropped.
    async fn search(
        &self,
        user_id: &str,
        query: &str,
        embedding: Option<&[f32]>,
        limit: usize,
    ) -> Result<Vec<Insight>, StorageError>;

    /// A user's most recent insights, newest first.
    async fn user_insights(&self, user_id: &str, limit: usize) -> Result<Vec<Insight>, StorageError>;

    /// One of a user's insights by id.
    ///
    /// Returns [`StorageError::NotFound`] when the id does not exist or
    /// belongs to another user.
    async fn get(&self, user_id: &str, id: i64) -> Result<Insight, StorageError>;
}
