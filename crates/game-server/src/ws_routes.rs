//! WebSocket transport.
//!
//! One socket, one player, one session. The receive half of the socket
//! parses commands and drives the session actor; an unbounded event
//! channel decouples the engine from the send half so the replay loop
//! never blocks on a slow client.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use game_core::config::{DEFAULT_TICK, GAME_LENGTH, MAX_ACTIVE_INSTRUMENTS};
use game_core::{
    sample, spawn_session, EventSink, GameError, GameEvent, ScoreStore, Session, SessionCommand,
    SessionHandle, TradeSide,
};

use crate::AppState;

// ---------------------------------------------------------------------------
// Inbound protocol
// ---------------------------------------------------------------------------

/// Commands a client may send over the socket, tagged like the outbound
/// events: `{"type":"trade","instrument":"BTC","side":"BUY","amount":100}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    StartGame {
        username: Option<String>,
        /// Empty means "play everything the catalog offers".
        #[serde(default)]
        instruments: Vec<String>,
        /// Seconds between candle reveals.
        speed: Option<f64>,
    },
    UpdateSpeed {
        speed: f64,
    },
    Trade {
        instrument: String,
        side: TradeSide,
        amount: f64,
    },
}

/// Seconds-as-float from the wire into a tick duration. Rejects NaN and
/// negatives; range clamping happens in the session config.
fn tick_from_speed(speed: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(speed).ok()
}

// ---------------------------------------------------------------------------
// Event sink backed by the per-connection channel
// ---------------------------------------------------------------------------

struct ChannelSink {
    tx: mpsc::UnboundedSender<GameEvent>,
}

impl EventSink for ChannelSink {
    fn emit(&self, event: GameEvent) {
        // Fire-and-forget: if the drain task is gone the connection is
        // closing and the event has nowhere to go anyway.
        let _ = self.tx.send(event);
    }
}

// ---------------------------------------------------------------------------
// Socket lifecycle
// ---------------------------------------------------------------------------

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let owner_id = Uuid::new_v4();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let sink = Arc::new(ChannelSink { tx: event_tx });

    // Drain engine events to the socket until every sender is gone.
    let send_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    tracing::error!(error = %err, "failed to serialize event");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    tracing::info!(owner = %owner_id, "client connected");

    // The start popup needs the instrument list before any game exists.
    match state.catalog.available() {
        Ok(instruments) => sink.emit(GameEvent::AvailableInstruments { instruments }),
        Err(err) => {
            tracing::error!(error = %err, "catalog unavailable");
            sink.emit(GameEvent::Error {
                message: "market data unavailable".to_string(),
            });
        }
    }

    let mut game: Option<SessionHandle> = None;
    while let Some(Ok(message)) = ws_rx.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        match serde_json::from_str::<ClientCommand>(&text) {
            Ok(command) => handle_command(command, &state, owner_id, &sink, &mut game).await,
            Err(err) => sink.emit(GameEvent::Error {
                message: format!("unrecognized command: {err}"),
            }),
        }
    }

    // Disconnect: stop the loop (no settlement), then let the drain task
    // run dry once the last sender drops.
    if let Some(handle) = game.take() {
        handle.stop().await;
    }
    drop(sink);
    let _ = send_task.await;

    tracing::info!(owner = %owner_id, "client disconnected");
}

async fn handle_command(
    command: ClientCommand,
    state: &AppState,
    owner_id: Uuid,
    sink: &Arc<ChannelSink>,
    game: &mut Option<SessionHandle>,
) {
    match command {
        ClientCommand::StartGame {
            username,
            instruments,
            speed,
        } => {
            // One loop per session: wind the old game down before the
            // new one may tick.
            if let Some(old) = game.take() {
                old.stop().await;
            }
            match start_game(state, owner_id, username, &instruments, speed, sink.clone()) {
                Ok(handle) => *game = Some(handle),
                Err(err) => sink.emit(GameEvent::Error {
                    message: err.to_string(),
                }),
            }
        }
        ClientCommand::UpdateSpeed { speed } => {
            let Some(tick) = tick_from_speed(speed) else {
                sink.emit(GameEvent::Error {
                    message: "speed must be a non-negative number of seconds".to_string(),
                });
                return;
            };
            if !forward(game, SessionCommand::SetSpeed { tick }).await {
                sink.emit(GameEvent::Error {
                    message: "no game in progress".to_string(),
                });
            }
        }
        ClientCommand::Trade {
            instrument,
            side,
            amount,
        } => {
            let command = SessionCommand::Trade {
                instrument: instrument.trim().to_uppercase(),
                side,
                cash_amount: amount,
            };
            if !forward(game, command).await {
                sink.emit(GameEvent::Error {
                    message: "no game in progress".to_string(),
                });
            }
        }
    }
}

/// Hand a command to the running loop, if there is one.
async fn forward(game: &mut Option<SessionHandle>, command: SessionCommand) -> bool {
    match game {
        Some(handle) => handle.send(command).await,
        None => false,
    }
}

/// Sample today's scenario, configure a fresh session and spawn its loop.
fn start_game(
    state: &AppState,
    owner_id: Uuid,
    username: Option<String>,
    instruments: &[String],
    speed: Option<f64>,
    sink: Arc<ChannelSink>,
) -> Result<SessionHandle, GameError> {
    if instruments.len() > MAX_ACTIVE_INSTRUMENTS {
        return Err(GameError::InvalidConfiguration(format!(
            "at most {MAX_ACTIVE_INSTRUMENTS} instruments per game, got {}",
            instruments.len()
        )));
    }
    let tick = match speed {
        Some(speed) => tick_from_speed(speed).ok_or_else(|| {
            GameError::InvalidConfiguration(
                "speed must be a non-negative number of seconds".to_string(),
            )
        })?,
        None => DEFAULT_TICK,
    };

    let today = chrono::Utc::now().date_naive();
    let scenario = sample(
        today,
        &state.catalog,
        instruments,
        GAME_LENGTH,
        MAX_ACTIVE_INSTRUMENTS,
    )?;

    let player_name = username
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("anon-{}", &owner_id.to_string()[..8]));

    let mut session = Session::create(owner_id, player_name);
    session.configure(scenario.instruments().cloned(), tick)?;

    let store: Arc<dyn ScoreStore> = Arc::new(state.scores.clone());
    Ok(spawn_session(session, scenario, sink, store))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}
