//! Tuning knobs for a game session.

use std::time::Duration;

/// Cash every player starts a scenario with.
pub const STARTING_CASH: f64 = 10_000.0;

/// Candles in one scenario window, opening snapshot included.
pub const GAME_LENGTH: usize = 300;

/// Candles revealed up front so the chart has context before the first tick.
pub const INITIAL_VISIBLE_CANDLES: usize = 60;

/// Most instruments a single session may play at once.
pub const MAX_ACTIVE_INSTRUMENTS: usize = 5;

/// Default time between candle reveals.
pub const DEFAULT_TICK: Duration = Duration::from_millis(500);

/// Tick bounds. The lower bound keeps a hostile speed update from turning
/// the loop into a busy spin, the upper bound from freezing the game.
pub const MIN_TICK: Duration = Duration::from_millis(50);
pub const MAX_TICK: Duration = Duration::from_secs(5);

/// Fraction by which a sell may exceed the held amount and still be
/// treated as "sell everything" (absorbs client-side rounding).
pub const SELL_TOLERANCE: f64 = 0.001;

/// Holdings below this snap to exactly zero so closed positions do not
/// accumulate residual dust.
pub const DUST_THRESHOLD: f64 = 1e-9;

pub fn clamp_tick(tick: Duration) -> Duration {
    tick.clamp(MIN_TICK, MAX_TICK)
}
