//! Quest storage backends
//!
//! Per-character quest variables live in `character_quests`, one row per
//! (char, quest, var). Quest-wide variables live in `quest_global_data`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

use super::state::STATE_VAR;
use crate::error::StoreError;

/// One persisted quest variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestVarRow {
    pub quest_name: String,
    pub var: String,
    pub value: String,
}

#[async_trait]
pub trait QuestStore: Send + Sync {
    async fn upsert_var(&self, quest: &str, char_id: i32, var: &str, value: &str) -> Result<(), StoreError>;

    async fn delete_var(&self, quest: &str, char_id: i32, var: &str) -> Result<(), StoreError>;

    /// Delete every variable of `quest` for `char_id`, or every variable but
    /// the lifecycle marker when `keep_state` is set
    async fn delete_quest(&self, quest: &str, char_id: i32, keep_state: bool) -> Result<(), StoreError>;

    async fn select_vars_for_char(&self, char_id: i32) -> Result<Vec<QuestVarRow>, StoreError>;

    async fn save_global_var(&self, quest: &str, var: &str, value: &str) -> Result<(), StoreError>;

    async fn load_global_var(&self, quest: &str, var: &str) -> Result<Option<String>, StoreError>;

    async fn delete_global_var(&self, quest: &str, var: &str) -> Result<(), StoreError>;
}

// ============================================================================
// SQLite
// ============================================================================

pub struct SqliteQuestStore {
    pool: SqlitePool,
}

impl SqliteQuestStore {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Self::migrate(&pool).await?;
        info!("Quest store ready at {}", database_url);

        Ok(Self { pool })
    }

    /// Private in-memory database. A single connection, since every sqlite
    /// memory connection is its own database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::new("sqlite::memory:", 1).await
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS character_quests (
                char_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                var TEXT NOT NULL,
                value TEXT NOT NULL,
                UNIQUE(char_id, name, var)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quest_global_data (
                quest_name TEXT NOT NULL,
                var TEXT NOT NULL,
                value TEXT NOT NULL,
                UNIQUE(quest_name, var)
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl QuestStore for SqliteQuestStore {
    async fn upsert_var(&self, quest: &str, char_id: i32, var: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO character_quests (char_id, name, var, value)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(char_id, name, var) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(char_id)
        .bind(quest)
        .bind(var)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_var(&self, quest: &str, char_id: i32, var: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM character_quests WHERE char_id = ? AND name = ? AND var = ?")
            .bind(char_id)
            .bind(quest)
            .bind(var)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_quest(&self, quest: &str, char_id: i32, keep_state: bool) -> Result<(), StoreError> {
        if keep_state {
            sqlx::query("DELETE FROM character_quests WHERE char_id = ? AND name = ? AND var != ?")
                .bind(char_id)
                .bind(quest)
                .bind(STATE_VAR)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query("DELETE FROM character_quests WHERE char_id = ? AND name = ?")
                .bind(char_id)
                .bind(quest)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn select_vars_for_char(&self, char_id: i32) -> Result<Vec<QuestVarRow>, StoreError> {
        let rows = sqlx::query(
            "SELECT name, var, value FROM character_quests WHERE char_id = ? ORDER BY name, var",
        )
        .bind(char_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| QuestVarRow {
                quest_name: row.get("name"),
                var: row.get("var"),
                value: row.get("value"),
            })
            .collect())
    }

    async fn save_global_var(&self, quest: &str, var: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO quest_global_data (quest_name, var, value)
            VALUES (?, ?, ?)
            ON CONFLICT(quest_name, var) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(quest)
        .bind(var)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_global_var(&self, quest: &str, var: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT value FROM quest_global_data WHERE quest_name = ? AND var = ?")
            .bind(quest)
            .bind(var)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get("value")))
    }

    async fn delete_global_var(&self, quest: &str, var: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM quest_global_data WHERE quest_name = ? AND var = ?")
            .bind(quest)
            .bind(var)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Store kept entirely in memory. Can be switched into a failing mode to
/// exercise error paths.
#[derive(Default)]
pub struct MemoryQuestStore {
    vars: DashMap<(i32, String, String), String>,
    globals: DashMap<(String, String), String>,
    failing: AtomicBool,
}

impl MemoryQuestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store set to fail".to_string()))
        } else {
            Ok(())
        }
    }

    /// Snapshot of one character's variables for `quest`
    pub fn vars_of(&self, char_id: i32, quest: &str) -> HashMap<String, String> {
        self.vars
            .iter()
            .filter(|e| e.key().0 == char_id && e.key().1 == quest)
            .map(|e| (e.key().2.clone(), e.value().clone()))
            .collect()
    }
}

#[async_trait]
impl QuestStore for MemoryQuestStore {
    async fn upsert_var(&self, quest: &str, char_id: i32, var: &str, value: &str) -> Result<(), StoreError> {
        self.check()?;
        self.vars
            .insert((char_id, quest.to_string(), var.to_string()), value.to_string());
        Ok(())
    }

    async fn delete_var(&self, quest: &str, char_id: i32, var: &str) -> Result<(), StoreError> {
        self.check()?;
        self.vars
            .remove(&(char_id, quest.to_string(), var.to_string()));
        Ok(())
    }

    async fn delete_quest(&self, quest: &str, char_id: i32, keep_state: bool) -> Result<(), StoreError> {
        self.check()?;
        self.vars.retain(|(c, q, var), _| {
            !(*c == char_id && q == quest && !(keep_state && var == STATE_VAR))
        });
        Ok(())
    }

    async fn select_vars_for_char(&self, char_id: i32) -> Result<Vec<QuestVarRow>, StoreError> {
        self.check()?;
        let mut rows: Vec<QuestVarRow> = self
            .vars
            .iter()
            .filter(|e| e.key().0 == char_id)
            .map(|e| QuestVarRow {
                quest_name: e.key().1.clone(),
                var: e.key().2.clone(),
                value: e.value().clone(),
            })
            .collect();
        rows.sort_by(|a, b| (&a.quest_name, &a.var).cmp(&(&b.quest_name, &b.var)));
        Ok(rows)
    }

    async fn save_global_var(&self, quest: &str, var: &str, value: &str) -> Result<(), StoreError> {
        self.check()?;
        self.globals
            .insert((quest.to_string(), var.to_string()), value.to_string());
        Ok(())
    }

    async fn load_global_var(&self, quest: &str, var: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        Ok(self
            .globals
            .get(&(quest.to_string(), var.to_string()))
            .map(|v| v.clone()))
    }

    async fn delete_global_var(&self, quest: &str, var: &str) -> Result<(), StoreError> {
        self.check()?;
        self.globals.remove(&(quest.to_string(), var.to_string()));
        Ok(())
    }
}
