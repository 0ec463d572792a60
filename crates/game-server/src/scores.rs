//! Score persistence.
//!
//! One sqlite row per completed game. The replay loop writes through the
//! [`ScoreStore`] seam and treats failures as log-only; the leaderboard
//! endpoint reads the same table.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use game_core::ScoreStore;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS scores (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL,
    score REAL NOT NULL,
    assets TEXT NOT NULL,
    created_at TEXT NOT NULL
)";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScoreRow {
    pub username: String,
    pub score: f64,
    pub assets: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ScoreDb {
    pool: SqlitePool,
}

impl ScoreDb {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn insert(&self, username: &str, score: f64, assets: &str) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO scores (username, score, assets, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(username)
        .bind(score)
        .bind(assets)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Best scores first.
    pub async fn top(&self, limit: i64) -> Result<Vec<ScoreRow>> {
        let rows = sqlx::query_as::<_, ScoreRow>(
            "SELECT username, score, assets, created_at FROM scores \
             ORDER BY score DESC, created_at ASC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[async_trait]
impl ScoreStore for ScoreDb {
    async fn save(
        &self,
        player_name: &str,
        final_value: f64,
        instruments: &[String],
    ) -> Result<()> {
        self.insert(player_name, final_value, &instruments.join(","))
            .await?;
        Ok(())
    }
}
