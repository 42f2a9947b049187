//! Assistant storage using SQLite
//!
//! A single [`MemoryStore`] owns the pool and backs every collaborator the
//! engine talks to: the profile row, the chat history and its rolling
//! summaries, and the categorized semantic memory.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::str::FromStr;

use crate::tools::ToolOutcome;

use super::history::Summarizer;
use super::profile::{Profile, ProfileStore};

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid memory category: {0}")]
    InvalidCategory(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Memory collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryCategory {
    #[serde(rename = "cognitive_memories")]
    Cognitive,
    #[serde(rename = "identity_links")]
    Identity,
    #[serde(rename = "personal_facts")]
    PersonalFact,
}

impl MemoryCategory {
    pub const ALL: [MemoryCategory; 3] = [
        MemoryCategory::Cognitive,
        MemoryCategory::Identity,
        MemoryCategory::PersonalFact,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::Cognitive => "cognitive_memories",
            MemoryCategory::Identity => "identity_links",
            MemoryCategory::PersonalFact => "personal_facts",
        }
    }
}

impl FromStr for MemoryCategory {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cognitive_memories" | "cognitive" => Ok(MemoryCategory::Cognitive),
            "identity_links" | "identity" => Ok(MemoryCategory::Identity),
            "personal_facts" | "personal_fact" | "personal-fact" => Ok(MemoryCategory::PersonalFact),
            _ => Err(MemoryError::InvalidCategory(s.to_string())),
        }
    }
}

/// What a semantic memory backend can do, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryCapabilities {
    pub search: bool,
    pub append: bool,
}

impl MemoryCapabilities {
    pub const FULL: MemoryCapabilities = MemoryCapabilities {
        search: true,
        append: true,
    };
}

#[async_trait]
pub trait SemanticMemory: Send + Sync {
    fn capabilities(&self) -> MemoryCapabilities;

    async fn add(&self, category: MemoryCategory, text: &str) -> Result<(), MemoryError>;

    /// Most relevant entries first; empty when nothing matches
    async fn search(&self, category: MemoryCategory, query: &str) -> Result<Vec<String>, MemoryError>;
}

/// Tuning for the store
#[derive(Debug, Clone)]
pub struct MemorySettings {
    /// Number of memories returned per search
    pub k: usize,
    /// Turns returned by `recent_history`
    pub max_history_pairs: usize,
    /// Cap for fallback summaries
    pub max_characters: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            k: 3,
            max_history_pairs: 5,
            max_characters: 1000,
        }
    }
}

/// SQLite-backed storage for the assistant
pub struct MemoryStore {
    pub(super) pool: SqlitePool,
    pub(super) settings: MemorySettings,
    pub(super) summarizer: Option<Summarizer>,
}

impl MemoryStore {
    /// Open (or create) the database at the given path
    pub async fn new(db_path: &Path, settings: MemorySettings) -> Result<Self, MemoryError> {
        // Create parent directories if they don't exist
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true);

        // Single writer
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            settings,
            summarizer: None,
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create an in-memory store asynchronously
    pub async fn new_in_memory_async() -> Result<Self, MemoryError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self {
            pool,
            settings: MemorySettings::default(),
            summarizer: None,
        };
        store.init_schema().await?;
        Ok(store)
    }

    /// Summaries are written by the model when a summarizer is attached
    pub fn with_summarizer(mut self, summarizer: Summarizer) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_settings(mut self, settings: MemorySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Initialize the database schema
    async fn init_schema(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_info (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT,
                last_name TEXT,
                age INTEGER,
                gender TEXT,
                location TEXT,
                occupation TEXT,
                interests TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_message TEXT NOT NULL,
                assistant_message TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS summary (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                summary_text TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                category TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_memories_category
            ON memories(category, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Single user: make sure the profile row exists
        sqlx::query(
            r#"
            INSERT INTO user_info (name)
            SELECT NULL WHERE NOT EXISTS (SELECT 1 FROM user_info)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Number of stored chat turns
    pub async fn count_turns(&self) -> Result<i64, MemoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chat_history")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Number of stored memories across all categories
    pub async fn count_memories(&self) -> Result<i64, MemoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM memories")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn write_profile(&self, profile: &Profile) -> Result<(), MemoryError> {
        let interests = if profile.interests.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&profile.interests)?)
        };

        sqlx::query(
            r#"
            UPDATE user_info
            SET name = ?, last_name = ?, age = ?, gender = ?, location = ?, occupation = ?, interests = ?
            WHERE id = (SELECT id FROM user_info ORDER BY id LIMIT 1)
            "#,
        )
        .bind(&profile.name)
        .bind(&profile.last_name)
        .bind(profile.age)
        .bind(&profile.gender)
        .bind(&profile.location)
        .bind(&profile.occupation)
        .bind(interests)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Interests column holds a JSON array; older rows hold a comma list
fn parse_interests_column(raw: &str) -> BTreeSet<String> {
    serde_json::from_str::<Vec<String>>(raw)
        .unwrap_or_else(|_| raw.split(',').map(str::to_string).collect())
        .into_iter()
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .collect()
}

type ProfileRow = (
    Option<String>,
    Option<String>,
    Option<i64>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn read(&self) -> Result<Option<Profile>, MemoryError> {
        let row: Option<ProfileRow> = sqlx::query_as(
            r#"
            SELECT name, last_name, age, gender, location, occupation, interests
            FROM user_info
            ORDER BY id
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(name, last_name, age, gender, location, occupation, interests)| {
                let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
                Profile {
                    name: non_empty(name),
                    last_name: non_empty(last_name),
                    age,
                    gender: non_empty(gender),
                    location: non_empty(location),
                    occupation: non_empty(occupation),
                    interests: interests
                        .as_deref()
                        .map(parse_interests_column)
                        .unwrap_or_default(),
                }
            },
        ))
    }

    async fn update(&self, fields: &Map<String, Value>) -> Result<ToolOutcome, MemoryError> {
        let mut profile = self.read().await?.unwrap_or_default();

        if let Err(e) = profile.apply(fields) {
            return Ok(ToolOutcome::failure(e.to_string()));
        }

        self.write_profile(&profile).await?;
        tracing::info!(fields = ?fields.keys().collect::<Vec<_>>(), "Profile updated");
        Ok(ToolOutcome::success(format!("Profile updated: {}", profile)))
    }
}

#[async_trait]
impl SemanticMemory for MemoryStore {
    fn capabilities(&self) -> MemoryCapabilities {
        MemoryCapabilities::FULL
    }

    async fn add(&self, category: MemoryCategory, text: &str) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            INSERT INTO memories (id, category, content, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(category.as_str())
        .bind(text)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        tracing::debug!(category = category.as_str(), "Memory added");
        Ok(())
    }

    async fn search(&self, category: MemoryCategory, query: &str) -> Result<Vec<String>, MemoryError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT content
            FROM memories
            WHERE category = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(category.as_str())
        .fetch_all(&self.pool)
        .await?;

        let entries: Vec<String> = rows.into_iter().map(|(content,)| content).collect();
        Ok(rank_memories(query, &entries, self.settings.k))
    }
}

const STOPWORDS: &[&str] = &[
    "a", "about", "am", "an", "and", "are", "as", "at", "be", "can", "did", "do", "does", "for",
    "from", "how", "i", "in", "is", "it", "me", "my", "of", "on", "or", "s", "that", "the",
    "this", "to", "user", "was", "what", "when", "where", "which", "who", "why", "with", "you",
    "your",
];

fn content_words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Rank entries (newest first) by content-word overlap with the query.
/// Entries sharing no content word are dropped; ties keep recency order.
pub fn rank_memories(query: &str, entries: &[String], k: usize) -> Vec<String> {
    let wanted = content_words(query);
    if wanted.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(usize, usize)> = entries
        .iter()
        .enumerate()
        .filter_map(|(idx, entry)| {
            let overlap = content_words(entry).intersection(&wanted).count();
            (overlap > 0).then_some((overlap, idx))
        })
        .collect();

    // Stable sort keeps the newest-first order among equal scores
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    scored
        .into_iter()
        .take(k)
        .map(|(_, idx)| entries[idx].clone())
        .collect()
}
