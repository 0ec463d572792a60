//! The per-session replay loop.
//!
//! Each active session is one tokio task that owns the `Session`
//! outright. Ticks, trades, speed changes and settlement all run inside
//! it, so a trade can never interleave with a tick's read-modify-write.
//! The outside world reaches the loop only through its command channel;
//! dropping the sender (connection loss) aborts the loop at its next
//! poll, one tick boundary at the latest.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::{self, INITIAL_VISIBLE_CANDLES, STARTING_CASH};
use crate::events::{EventSink, GameEvent, ScoreStore};
use crate::ledger::{self, TradeSide};
use crate::scenario::Scenario;
use crate::session::{ReplayState, Session};
use crate::valuation::valuate;

/// Commands a connection may inject into its running session.
#[derive(Debug)]
pub enum SessionCommand {
    Trade {
        instrument: String,
        side: TradeSide,
        cash_amount: f64,
    },
    SetSpeed {
        tick: Duration,
    },
    Stop,
}

/// Owner-side handle to a spawned replay loop.
///
/// Exactly one loop exists per session; to start a new scenario on the
/// same connection, `stop()` the old handle first and await it.
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    task: tokio::task::JoinHandle<Session>,
}

impl SessionHandle {
    /// Queue a command for the loop. Returns false once the loop has
    /// terminated (the game ended or was already stopped).
    pub async fn send(&self, command: SessionCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Stop the loop and wait for it to wind down. No settlement is
    /// performed for a stopped game.
    pub async fn stop(self) -> Option<Session> {
        let _ = self.commands.send(SessionCommand::Stop).await;
        self.task.await.ok()
    }

    /// Wait for the loop to finish on its own. The command channel is
    /// kept open while waiting so the loop does not read the wait as a
    /// disconnect.
    pub async fn join(self) -> Option<Session> {
        let SessionHandle { commands, task } = self;
        let session = task.await.ok();
        drop(commands);
        session
    }
}

/// Spawn the replay loop for a configured session.
pub fn spawn_session(
    session: Session,
    scenario: Scenario,
    sink: Arc<dyn EventSink>,
    store: Arc<dyn ScoreStore>,
) -> SessionHandle {
    let (commands, command_rx) = mpsc::channel(64);
    let task = tokio::spawn(run_session(session, scenario, sink, store, command_rx));
    SessionHandle { commands, task }
}

async fn run_session(
    mut session: Session,
    scenario: Scenario,
    sink: Arc<dyn EventSink>,
    store: Arc<dyn ScoreStore>,
    mut commands: mpsc::Receiver<SessionCommand>,
) -> Session {
    session.state = ReplayState::Running;

    // Opening snapshot: the first stretch of each instrument's window,
    // revealed at once so the player has chart context.
    let visible = INITIAL_VISIBLE_CANDLES.min(scenario.length());
    for symbol in scenario.instruments() {
        if let Some(candles) = scenario.window(symbol, visible) {
            sink.emit(GameEvent::History {
                instrument: symbol.clone(),
                candles: candles.to_vec(),
            });
        }
    }
    session.time_index = visible;
    sink.emit(GameEvent::PortfolioState(valuate(&session, &scenario)));

    tracing::info!(
        owner = %session.owner_id,
        player = %session.player_name,
        instruments = scenario.instruments().count(),
        tick_ms = session.tick_interval.as_millis() as u64,
        "game started"
    );

    // Deadline-based timer: command handling between ticks must not
    // push the next reveal back.
    let sleep = tokio::time::sleep(session.tick_interval);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            () = &mut sleep => {
                if session.time_index >= scenario.length() {
                    settle(&mut session, &scenario, sink.as_ref(), store.as_ref()).await;
                    break;
                }
                for symbol in scenario.instruments() {
                    if let Some(candle) = scenario.candle(symbol, session.time_index) {
                        sink.emit(GameEvent::Candle {
                            instrument: symbol.clone(),
                            candle,
                        });
                    }
                }
                session.time_index += 1;
                sink.emit(GameEvent::PortfolioState(valuate(&session, &scenario)));
                sleep.as_mut().reset(Instant::now() + session.tick_interval);
            }
            command = commands.recv() => match command {
                Some(SessionCommand::Trade { instrument, side, cash_amount }) => {
                    match ledger::execute_trade(&mut session, &scenario, &instrument, side, cash_amount) {
                        Ok(()) => sink.emit(GameEvent::PortfolioState(valuate(&session, &scenario))),
                        Err(err) => sink.emit(GameEvent::Error { message: err.to_string() }),
                    }
                }
                Some(SessionCommand::SetSpeed { tick }) => {
                    // Takes effect when the timer is next re-armed.
                    session.tick_interval = config::clamp_tick(tick);
                }
                Some(SessionCommand::Stop) | None => {
                    session.state = ReplayState::Aborted;
                    tracing::info!(owner = %session.owner_id, "game aborted");
                    break;
                }
            }
        }
    }

    session
}

/// Final valuation and score persistence, exactly once per session.
///
/// The completion event is computed and emitted regardless of whether
/// the score row makes it to storage; a persistence failure is logged,
/// never propagated.
async fn settle(
    session: &mut Session,
    scenario: &Scenario,
    sink: &dyn EventSink,
    store: &dyn ScoreStore,
) {
    if session.state == ReplayState::Finished {
        return;
    }
    session.state = ReplayState::Finished;

    let snapshot = valuate(session, scenario);
    let final_value = snapshot.total_value;
    let pnl_percent = (final_value - STARTING_CASH) / STARTING_CASH * 100.0;
    let instruments: Vec<String> = scenario.instruments().cloned().collect();

    if let Err(err) = store
        .save(&session.player_name, final_value, &instruments)
        .await
    {
        tracing::warn!(
            player = %session.player_name,
            error = %err,
            "score persistence failed; game outcome stands"
        );
    }

    sink.emit(GameEvent::GameOver {
        final_value,
        pnl_percent,
    });

    tracing::info!(
        owner = %session.owner_id,
        player = %session.player_name,
        final_value,
        pnl_percent,
        "game settled"
    );
}
