//! Leaderboard read endpoint.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::scores::ScoreRow;
use crate::{AppError, AppState};

const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 100;

#[derive(Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<i64>,
}

/// Row shape the scoreboard UI consumes.
#[derive(Debug, Serialize, PartialEq)]
pub struct LeaderboardEntry {
    pub username: String,
    pub score: f64,
    pub assets: String,
    pub date: String,
}

impl From<ScoreRow> for LeaderboardEntry {
    fn from(row: ScoreRow) -> Self {
        Self {
            username: row.username,
            score: (row.score * 100.0).round() / 100.0,
            assets: row.assets,
            date: row.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

async fn get_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let rows = state.scores.top(limit).await?;
    Ok(Json(rows.into_iter().map(LeaderboardEntry::from).collect()))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/leaderboard", get(get_leaderboard))
}
