//! CoinDuel game server.
//!
//! Axum front for the replay engine: a WebSocket endpoint per player, a
//! sqlite-backed leaderboard, and the process bootstrap (config, logging,
//! catalog warm-up).

pub mod leaderboard_routes;
pub mod scores;
pub mod ws_routes;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use market_data::MarketCatalog;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use game_core::config::GAME_LENGTH;

use crate::scores::ScoreDb;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<MarketCatalog>,
    pub scores: ScoreDb,
}

/// Anyhow-backed handler error: logged, returned as a bare 500.
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub struct ServerConfig {
    pub data_dir: String,
    pub database_url: String,
    pub bind_addr: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("COINDUEL_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:coinduel.db".to_string()),
            bind_addr: std::env::var("COINDUEL_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(ws_routes::routes())
        .merge(leaderboard_routes::routes())
        // The chart client is served from another origin in development.
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "game_server=info,game_core=info,tower_http=warn".into()),
        )
        .init();

    let config = ServerConfig::from_env();
    let catalog = Arc::new(MarketCatalog::new(&config.data_dir, GAME_LENGTH));
    match catalog.available() {
        Ok(instruments) => {
            tracing::info!(count = instruments.len(), "market catalog ready");
        }
        Err(err) => {
            tracing::warn!(error = %err, data_dir = %config.data_dir, "no market data found");
        }
    }

    let scores = ScoreDb::connect(&config.database_url).await?;
    let state = AppState { catalog, scores };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}
