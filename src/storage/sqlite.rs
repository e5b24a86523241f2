//! SQLite-backed memory and insight store.
//!
//! One connection guarded by a mutex; every call runs on the blocking
//! pool so the async pipeline never waits on disk I/O directly.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use super::insight::{
    classify_insight_type, cosine_similarity, decode_embedding, derive_summary, derive_tags,
    derive_title, encode_embedding, keyword_overlap,
};
use super::models::{
    EntityCount, Holding, Insight, MessageRole, NewInsight, NewMessage, StoredMessage,
    UserContext, UserProfile,
};
use super::{InsightStore, MemoryStore};
use crate::core::truncate_graphemes;
use crate::error::StorageError;

/// Graphemes of assistant replies kept in history.
const ASSISTANT_CONTENT_LEN: usize = 500;
/// Messages scanned when assembling user context.
const CONTEXT_HISTORY: usize = 20;
/// Recent messages carried in user context.
const CONTEXT_RECENT: usize = 5;
/// Frequent entities carried in user context.
const CONTEXT_ENTITIES: usize = 10;
/// Items of each kind named in the context summary.
const SUMMARY_ITEMS: usize = 3;
/// Current schema version.
const SCHEMA_VERSION: &str = "1";

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS schema_info (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_profiles (
    user_id TEXT PRIMARY KEY,
    risk_tolerance TEXT,
    investment_goal TEXT,
    experience_level TEXT,
    preferred_sectors TEXT NOT NULL DEFAULT '[]',
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_holdings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    symbol TEXT NOT NULL,
    name TEXT NOT NULL,
    quantity REAL NOT NULL,
    avg_price REAL,
    created_at TEXT NOT NULL,
    UNIQUE (user_id, symbol)
);

CREATE TABLE IF NOT EXISTS user_interests (
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    added_at TEXT NOT NULL,
    PRIMARY KEY (user_id, name)
);

CREATE TABLE IF NOT EXISTS conversation_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    entities TEXT NOT NULL DEFAULT '[]',
    intent TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_history_user_session
    ON conversation_history (user_id, session_id, id DESC);

CREATE TABLE IF NOT EXISTS insights (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    summary TEXT NOT NULL,
    insight_type TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    query TEXT NOT NULL,
    content TEXT NOT NULL,
    entities TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT '{}',
    embedding BLOB,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_insights_user ON insights (user_id, id DESC);
";

const TABLES: [&str; 6] = [
    "insights",
    "conversation_history",
    "user_interests",
    "user_holdings",
    "user_profiles",
    "schema_info",
];

const MESSAGE_COLUMNS: &str = "id, user_id, session_id, role, content, entities, intent, created_at";
const INSIGHT_COLUMNS: &str =
    "id, user_id, title, summary, insight_type, tags, query, content, entities, created_at, embedding";

/// Memory and insight store over one SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file at `path`.
    ///
    /// The schema is not created; call [`init`](Self::init) first.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an initialized in-memory database.
    pub fn in_memory() -> Result<Self, StorageError> {
        let store = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        };
        store.init()?;
        Ok(store)
    }

    /// Creates the schema. Idempotent.
    pub fn init(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)?;
        conn.execute(
            "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?1)",
            params![SCHEMA_VERSION],
        )?;
        info!(version = SCHEMA_VERSION, "database schema ready");
        Ok(())
    }

    /// Drops every table and recreates the schema.
    pub fn reset(&self) -> Result<(), StorageError> {
        {
            let conn = self.lock()?;
            for table in TABLES {
                conn.execute_batch(&format!("DROP TABLE IF EXISTS {table};"))?;
            }
        }
        self.init()
    }

    /// Whether [`init`](Self::init) has run against this database.
    pub fn is_initialized(&self) -> Result<bool, StorageError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_info'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StorageError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn json_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<StoredMessage> {
    let role: String = row.get(3)?;
    let entities: String = row.get(5)?;
    Ok(StoredMessage {
        id: row.get(0)?,
        message: NewMessage {
            user_id: row.get(1)?,
            session_id: row.get(2)?,
            role: MessageRole::parse(&role),
            content: row.get(4)?,
            entities: json_list(&entities),
            intent: row.get(6)?,
        },
        created_at: row.get(7)?,
    })
}

fn insight_from_row(row: &Row<'_>) -> rusqlite::Result<(Insight, Option<Vec<u8>>)> {
    let tags: String = row.get(5)?;
    let entities: String = row.get(8)?;
    Ok((
        Insight {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            summary: row.get(3)?,
            insight_type: row.get(4)?,
            tags: json_list(&tags),
            query: row.get(6)?,
            content: row.get(7)?,
            entities: json_list(&entities),
            created_at: row.get(9)?,
            score: None,
        },
        row.get(10)?,
    ))
}

fn load_history(
    conn: &Connection,
    user_id: &str,
    session_id: Option<&str>,
    limit: usize,
) -> Result<Vec<StoredMessage>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM conversation_history
         WHERE user_id = ?1 AND (?2 IS NULL OR session_id = ?2)
         ORDER BY id DESC LIMIT ?3"
    ))?;
    let rows = stmt.query_map(
        params![user_id, session_id, limit_param(limit)],
        message_from_row,
    )?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn load_profile(conn: &Connection, user_id: &str) -> Result<Option<UserProfile>, StorageError> {
    let profile = conn
        .query_row(
            "SELECT user_id, risk_tolerance, investment_goal, experience_level, preferred_sectors
             FROM user_profiles WHERE user_id = ?1",
            params![user_id],
            |row| {
                let sectors: String = row.get(4)?;
                Ok(UserProfile {
                    user_id: row.get(0)?,
                    risk_tolerance: row.get(1)?,
                    investment_goal: row.get(2)?,
                    experience_level: row.get(3)?,
                    preferred_sectors: json_list(&sectors),
                })
            },
        )
        .optional()?;
    Ok(profile)
}

fn load_holdings(conn: &Connection, user_id: &str) -> Result<Vec<Holding>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT symbol, name, quantity, avg_price FROM user_holdings
         WHERE user_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok(Holding {
            symbol: row.get(0)?,
            name: row.get(1)?,
            quantity: row.get(2)?,
            avg_price: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn load_interests(conn: &Connection, user_id: &str) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM user_interests WHERE user_id = ?1 ORDER BY added_at, rowid",
    )?;
    let rows = stmt.query_map(params![user_id], |row| row.get(0))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Entity mention counts, most frequent first; ties keep first-seen order.
fn frequent_entities(messages: &[StoredMessage]) -> Vec<EntityCount> {
    let mut counts: Vec<EntityCount> = Vec::new();
    for entity in messages.iter().flat_map(|m| &m.message.entities) {
        match counts.iter_mut().find(|c| &c.name == entity) {
            Some(count) => count.count += 1,
            None => counts.push(EntityCount {
                name: entity.clone(),
                count: 1,
            }),
        }
    }
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(CONTEXT_ENTITIES);
    counts
}

fn context_summary(
    profile: Option<&UserProfile>,
    holdings: &[Holding],
    interests: &[String],
    entities: &[EntityCount],
) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(p) = profile {
        parts.push(format!(
            "experience: {}, risk tolerance: {}",
            p.experience_level.as_deref().unwrap_or("unknown"),
            p.risk_tolerance.as_deref().unwrap_or("unknown"),
        ));
    }
    let names = |items: Vec<&str>| {
        items
            .into_iter()
            .take(SUMMARY_ITEMS)
            .collect::<Vec<_>>()
            .join(", ")
    };
    if !holdings.is_empty() {
        parts.push(format!(
            "holdings: {}",
            names(holdings.iter().map(|h| h.name.as_str()).collect())
        ));
    }
    if !interests.is_empty() {
        parts.push(format!(
            "interests: {}",
            names(interests.iter().map(String::as_str).collect())
        ));
    }
    if !entities.is_empty() {
        parts.push(format!(
            "recent topics: {}",
            names(entities.iter().map(|e| e.name.as_str()).collect())
        ));
    }
    (!parts.is_empty()).then(|| parts.join(" | "))
}

#[async_trait]
impl MemoryStore for SqliteStore {
    async fn get_user_context(
        &self,
        user_id: &str,
        session_id: Option<&str>,
    ) -> Result<UserContext, StorageError> {
        let user_id = user_id.to_string();
        let session_id = session_id.map(ToString::to_string);
        self.with_conn(move |conn| {
            let profile = load_profile(conn, &user_id)?;
            let holdings = load_holdings(conn, &user_id)?;
            let interests = load_interests(conn, &user_id)?;
            let mut recent = load_history(conn, &user_id, session_id.as_deref(), CONTEXT_HISTORY)?;
            let frequent = frequent_entities(&recent);
            recent.truncate(CONTEXT_RECENT);

            let Some(summary) = context_summary(profile.as_ref(), &holdings, &interests, &frequent)
            else {
                return Ok(UserContext::anonymous(&user_id));
            };
            Ok(UserContext {
                user_id,
                profile,
                holdings,
                interests,
                recent_messages: recent,
                frequent_entities: frequent,
                recent_insights: Vec::new(),
                summary,
            })
        })
        .await
    }

    async fn save_message(&self, message: NewMessage) -> Result<i64, StorageError> {
        self.with_conn(move |conn| {
            let content = match message.role {
                MessageRole::Assistant => {
                    truncate_graphemes(&message.content, ASSISTANT_CONTENT_LEN)
                }
                MessageRole::User => message.content,
            };
            conn.execute(
                "INSERT INTO conversation_history
                 (user_id, session_id, role, content, entities, intent, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    message.user_id,
                    message.session_id,
                    message.role.as_str(),
                    content,
                    serde_json::to_string(&message.entities)?,
                    message.intent,
                    Utc::now(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn history(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StorageError> {
        let user_id = user_id.to_string();
        let session_id = session_id.map(ToString::to_string);
        self.with_conn(move |conn| load_history(conn, &user_id, session_id.as_deref(), limit))
            .await
    }

    async fn upsert_profile(&self, profile: UserProfile) -> Result<(), StorageError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO user_profiles
                 (user_id, risk_tolerance, investment_goal, experience_level, preferred_sectors, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (user_id) DO UPDATE SET
                    risk_tolerance = COALESCE(excluded.risk_tolerance, risk_tolerance),
                    investment_goal = COALESCE(excluded.investment_goal, investment_goal),
                    experience_level = COALESCE(excluded.experience_level, experience_level),
                    preferred_sectors = CASE WHEN excluded.preferred_sectors = '[]'
                        THEN preferred_sectors ELSE excluded.preferred_sectors END,
                    updated_at = excluded.updated_at",
                params![
                    profile.user_id,
                    profile.risk_tolerance,
                    profile.investment_goal,
                    profile.experience_level,
                    serde_json::to_string(&profile.preferred_sectors)?,
                    Utc::now(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StorageError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| load_profile(conn, &user_id)).await
    }

    async fn add_holding(&self, user_id: &str, holding: Holding) -> Result<(), StorageError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO user_holdings (user_id, symbol, name, quantity, avg_price, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (user_id, symbol) DO UPDATE SET
                    name = excluded.name,
                    quantity = excluded.quantity,
                    avg_price = excluded.avg_price",
                params![
                    user_id,
                    holding.symbol,
                    holding.name,
                    holding.quantity,
                    holding.avg_price,
                    Utc::now(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn add_interest(&self, user_id: &str, name: &str) -> Result<(), StorageError> {
        let user_id = user_id.to_string();
        let name = name.trim().to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO user_interests (user_id, name, added_at) VALUES (?1, ?2, ?3)",
                params![user_id, name, Utc::now()],
            )?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl InsightStore for SqliteStore {
    async fn store(&self, insight: NewInsight) -> Result<i64, StorageError> {
        self.with_conn(move |conn| {
            let tags = derive_tags(&insight.content, &insight.entities);
            conn.execute(
                "INSERT INTO insights
                 (user_id, title, summary, insight_type, tags, query, content, entities,
                  metadata, embedding, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    insight.user_id,
                    derive_title(&insight.content, &insight.query),
                    derive_summary(&insight.content),
                    classify_insight_type(&insight.content),
                    serde_json::to_string(&tags)?,
                    insight.query,
                    insight.content,
                    serde_json::to_string(&insight.entities)?,
                    serde_json::to_string(&insight.metadata)?,
                    insight.embedding.as_deref().map(encode_embedding),
                    Utc::now(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn search(
        &self,
        user_id: &str,
        query: &str,
        embedding: Option<&[f32]>,
        limit: usize,
    ) -> Result<Vec<Insight>, StorageError> {
        let user_id = user_id.to_string();
        let query = query.to_string();
        let embedding = embedding.map(<[f32]>::to_vec);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INSIGHT_COLUMNS} FROM insights WHERE user_id = ?1 ORDER BY id DESC"
            ))?;
            let rows = stmt.query_map(params![user_id], insight_from_row)?;

            let mut scored = Vec::new();
            for row in rows {
                let (mut insight, blob) = row?;
                let stored = blob.as_deref().map(decode_embedding);
                let score = match (&embedding, &stored) {
                    (Some(q), Some(s)) if q.len() == s.len() => cosine_similarity(q, s),
                    _ => keyword_overlap(&query, &format!("{} {}", insight.title, insight.content)),
                };
                if score > 0.0 {
                    insight.score = Some(score);
                    scored.push(insight);
                }
            }
            scored.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            scored.truncate(limit);
            Ok(scored)
        })
        .await
    }

    async fn user_insights(&self, user_id: &str, limit: usize) -> Result<Vec<Insight>, StorageError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INSIGHT_COLUMNS} FROM insights WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![user_id, limit_param(limit)], insight_from_row)?;
            Ok(rows
                .map(|row| row.map(|(insight, _)| insight))
                .collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn get(&self, user_id: &str, id: i64) -> Result<Insight, StorageError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {INSIGHT_COLUMNS} FROM insights WHERE id = ?1 AND user_id = ?2"),
                params![id, user_id],
                insight_from_row,
            )
            .optional()?
            .map(|(insight, _)| insight)
            .ok_or_else(|| StorageError::NotFound {
                kind: "insight",
                identifier: id.to_string(),
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SqliteStore {
        SqliteStore::in_memory().unwrap_or_else(|_| unreachable!())
    }

    fn message(role: MessageRole, content: &str, entities: &[&str]) -> NewMessage {
        NewMessage {
            user_id: "u1".to_string(),
            session_id: "s1".to_string(),
            role,
            content: content.to_string(),
            entities: entities.iter().map(ToString::to_string).collect(),
            intent: Some("complex".to_string()),
        }
    }

    #[test]
    fn test_open_init_reset() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let path = dir.path().join("nested").join("insight.db");
        let store = SqliteStore::open(&path).unwrap_or_else(|_| unreachable!());
        assert!(!store.is_initialized().unwrap_or(true));
        store.init().unwrap_or_else(|_| unreachable!());
        assert!(store.is_initialized().unwrap_or(false));
        store.reset().unwrap_or_else(|_| unreachable!());
        assert!(store.is_initialized().unwrap_or(false));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_unknown_user_is_anonymous() {
        let ctx = store()
            .get_user_context("nobody", None)
            .await
            .unwrap_or_default();
        assert_eq!(ctx, UserContext::anonymous("nobody"));
    }

    #[tokio::test]
    async fn test_save_message_truncates_assistant_only() {
        let store = store();
        let long = "가".repeat(800);
        store
            .save_message(message(MessageRole::User, &long, &[]))
            .await
            .unwrap_or_default();
        store
            .save_message(message(MessageRole::Assistant, &long, &[]))
            .await
            .unwrap_or_default();
        let history = store.history("u1", Some("s1"), 10).await.unwrap_or_default();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message.role, MessageRole::Assistant);
        assert_eq!(history[0].message.content.chars().count(), 500);
        assert_eq!(history[1].message.content.chars().count(), 800);
        assert!(store.history("u1", Some("other"), 10).await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_user_context_assembly() {
        let store = store();
        store
            .upsert_profile(UserProfile {
                user_id: "u1".to_string(),
                risk_tolerance: Some("moderate".to_string()),
                investment_goal: None,
                experience_level: Some("beginner".to_string()),
                preferred_sectors: vec!["반도체".to_string()],
            })
            .await
            .unwrap_or_default();
        store
            .add_holding(
                "u1",
                Holding {
                    symbol: "005930".to_string(),
                    name: "삼성전자".to_string(),
                    quantity: 10.0,
                    avg_price: Some(70_000.0),
                },
            )
            .await
            .unwrap_or_default();
        store.add_interest("u1", "2차전지").await.unwrap_or_default();
        for (content, entities) in [
            ("삼성전자 전망", vec!["삼성전자"]),
            ("SK하이닉스와 삼성전자", vec!["SK하이닉스", "삼성전자"]),
            ("반도체", vec!["반도체"]),
        ] {
            store
                .save_message(message(MessageRole::User, content, &entities))
                .await
                .unwrap_or_default();
        }

        let ctx = store
            .get_user_context("u1", Some("s1"))
            .await
            .unwrap_or_default();
        assert_eq!(ctx.holdings.len(), 1);
        assert_eq!(ctx.interests, vec!["2차전지".to_string()]);
        assert_eq!(ctx.recent_messages.len(), 3);
        assert_eq!(ctx.frequent_entities[0].name, "삼성전자");
        assert_eq!(ctx.frequent_entities[0].count, 2);
        assert_eq!(
            ctx.summary,
            "experience: beginner, risk tolerance: moderate | holdings: 삼성전자 | interests: 2차전지 | recent topics: 삼성전자, 반도체, SK하이닉스"
        );
    }

    #[tokio::test]
    async fn test_profile_upsert_keeps_unset_fields() {
        let store = store();
        let mut profile = UserProfile {
            user_id: "u1".to_string(),
            risk_tolerance: Some("aggressive".to_string()),
            investment_goal: Some("growth".to_string()),
            experience_level: None,
            preferred_sectors: vec!["바이오".to_string()],
        };
        store.upsert_profile(profile.clone()).await.unwrap_or_default();
        profile.risk_tolerance = None;
        profile.preferred_sectors.clear();
        profile.experience_level = Some("expert".to_string());
        store.upsert_profile(profile).await.unwrap_or_default();

        let stored = store.get_profile("u1").await.unwrap_or_default();
        let stored = stored.unwrap_or_default();
        assert_eq!(stored.risk_tolerance.as_deref(), Some("aggressive"));
        assert_eq!(stored.experience_level.as_deref(), Some("expert"));
        assert_eq!(stored.preferred_sectors, vec!["바이오".to_string()]);
    }

    #[tokio::test]
    async fn test_insight_store_and_search() {
        let store = store();
        let first = NewInsight {
            user_id: "u1".to_string(),
            query: "삼성전자 전망".to_string(),
            content: "# 삼성전자 전망\n\n메모리 반도체 업황 회복으로 실적 개선이 예상됩니다.".to_string(),
            entities: vec!["삼성전자".to_string()],
            metadata: json!({"iterations": 1}),
            embedding: Some(vec![1.0, 0.0]),
        };
        let second = NewInsight {
            query: "현대자동차 실적".to_string(),
            content: "전기차 판매 증가".to_string(),
            entities: vec!["현대자동차".to_string()],
            embedding: Some(vec![0.0, 1.0]),
            ..first.clone()
        };
        let id = store.store(first).await.unwrap_or_default();
        assert!(id > 0);
        store.store(second).await.unwrap_or_default();

        let hits = store
            .search("u1", "반도체", Some(&[0.9, 0.1]), 5)
            .await
            .unwrap_or_default();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, id);
        assert_eq!(hits[0].title, "메모리 반도체 업황 회복으로 실적 개선이 예상됩니다.");
        assert!(hits[0].tags.contains(&"시장전망".to_string()));

        let keyword_hits = store
            .search("u1", "메모리 반도체", None, 5)
            .await
            .unwrap_or_default();
        assert_eq!(keyword_hits.len(), 1);

        let recent = store.user_insights("u1", 1).await.unwrap_or_default();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].query, "현대자동차 실적");
        assert!(store.user_insights("u2", 5).await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_get_insight_by_id() {
        let store = store();
        let id = store
            .store(NewInsight {
                user_id: "u1".to_string(),
                query: "LG전자 전망".to_string(),
                content: "가전 수요 둔화".to_string(),
                entities: vec!["LG전자".to_string()],
                metadata: json!({}),
                embedding: None,
            })
            .await
            .unwrap_or_default();

        let found = store.get("u1", id).await.unwrap_or_else(|_| unreachable!());
        assert_eq!(found.id, id);
        assert_eq!(found.content, "가전 수요 둔화");

        assert!(matches!(
            store.get("u2", id).await,
            Err(StorageError::NotFound { kind: "insight", .. })
        ));
        let missing = store.get("u1", id + 100).await;
        assert!(matches!(
            missing,
            Err(StorageError::NotFound { ref identifier, .. }) if *identifier == (id + 100).to_string()
        ));
    }
}
