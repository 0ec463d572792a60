//! Per-connection session state.
//!
//! One connection owns exactly one `Session`; every mutation (ticks,
//! trades, settlement) happens inside that session's replay task, so the
//! type itself carries no locking.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::config::{self, MAX_ACTIVE_INSTRUMENTS, STARTING_CASH};
use crate::error::GameError;

/// Where a session is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayState {
    /// Created, no scenario running yet.
    Idle,
    /// Replay loop is ticking.
    Running,
    /// Scenario completed and settled.
    Finished,
    /// Connection dropped or game restarted; no settlement.
    Aborted,
}

impl std::fmt::Display for ReplayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayState::Idle => write!(f, "idle"),
            ReplayState::Running => write!(f, "running"),
            ReplayState::Finished => write!(f, "finished"),
            ReplayState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Holdings in one instrument.
///
/// `cost_basis` is the cash paid for the currently held amount. The two
/// fields move to zero together: a full close (or a dust-level residue)
/// resets both exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub amount: f64,
    pub cost_basis: f64,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.amount == 0.0
    }
}

/// Mutable per-connection game state.
#[derive(Debug, Clone)]
pub struct Session {
    pub owner_id: Uuid,
    pub player_name: String,
    pub cash: f64,
    pub positions: BTreeMap<String, Position>,
    /// Next candle to reveal; starts at the opening window size and only
    /// ever increases.
    pub time_index: usize,
    pub tick_interval: Duration,
    pub state: ReplayState,
}

impl Session {
    pub fn create(owner_id: Uuid, player_name: impl Into<String>) -> Self {
        Self {
            owner_id,
            player_name: player_name.into(),
            cash: STARTING_CASH,
            positions: BTreeMap::new(),
            time_index: 0,
            tick_interval: config::DEFAULT_TICK,
            state: ReplayState::Idle,
        }
    }

    /// Install the scenario's instrument set (zeroed positions) and the
    /// clamped tick interval.
    pub fn configure(
        &mut self,
        instruments: impl IntoIterator<Item = impl Into<String>>,
        tick_interval: Duration,
    ) -> Result<(), GameError> {
        let positions: BTreeMap<String, Position> = instruments
            .into_iter()
            .map(|s| (s.into(), Position::default()))
            .collect();

        if positions.is_empty() {
            return Err(GameError::InvalidConfiguration(
                "no instruments selected".to_string(),
            ));
        }
        if positions.len() > MAX_ACTIVE_INSTRUMENTS {
            return Err(GameError::InvalidConfiguration(format!(
                "at most {MAX_ACTIVE_INSTRUMENTS} instruments per game, got {}",
                positions.len()
            )));
        }

        self.positions = positions;
        self.tick_interval = config::clamp_tick(tick_interval);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.state == ReplayState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_defaults() {
        let session = Session::create(Uuid::new_v4(), "tester");
        assert_eq!(session.cash, STARTING_CASH);
        assert!(session.positions.is_empty());
        assert_eq!(session.time_index, 0);
        assert_eq!(session.state, ReplayState::Idle);
    }

    #[test]
    fn test_configure_installs_zeroed_positions() {
        let mut session = Session::create(Uuid::new_v4(), "tester");
        session
            .configure(["BTC", "ETH"], Duration::from_millis(200))
            .unwrap();
        assert_eq!(session.positions.len(), 2);
        assert!(session.positions["BTC"].is_flat());
        assert_eq!(session.tick_interval, Duration::from_millis(200));
    }

    #[test]
    fn test_configure_rejects_empty_set() {
        let mut session = Session::create(Uuid::new_v4(), "tester");
        let err = session
            .configure(Vec::<String>::new(), config::DEFAULT_TICK)
            .unwrap_err();
        assert!(matches!(err, GameError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_configure_rejects_oversized_set() {
        let mut session = Session::create(Uuid::new_v4(), "tester");
        let too_many: Vec<String> = (0..MAX_ACTIVE_INSTRUMENTS + 1)
            .map(|i| format!("SYM{i}"))
            .collect();
        let err = session
            .configure(too_many, config::DEFAULT_TICK)
            .unwrap_err();
        assert!(matches!(err, GameError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_configure_clamps_tick() {
        let mut session = Session::create(Uuid::new_v4(), "tester");
        session.configure(["BTC"], Duration::from_millis(1)).unwrap();
        assert_eq!(session.tick_interval, config::MIN_TICK);
    }
}
