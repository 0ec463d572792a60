//! Portfolio valuation.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::scenario::Scenario;
use crate::session::Session;

/// One instrument's slice of a valuation snapshot.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PositionView {
    pub amount: f64,
    pub value: f64,
    pub price: f64,
    pub pnl_percent: f64,
}

/// What the player sees after every tick and every successful trade.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioState {
    pub cash: f64,
    pub total_value: f64,
    pub positions: BTreeMap<String, PositionView>,
}

/// Price every position at the most recently revealed close.
///
/// Positions with no cost basis report 0% PnL; there is no division by
/// a zero basis.
pub fn valuate(session: &Session, scenario: &Scenario) -> PortfolioState {
    let mut positions = BTreeMap::new();
    let mut total_value = session.cash;

    for (symbol, position) in &session.positions {
        let price = last_revealed_close(session, scenario, symbol);
        let value = position.amount * price;
        let pnl_percent = if position.cost_basis > 0.0 {
            (value - position.cost_basis) / position.cost_basis * 100.0
        } else {
            0.0
        };
        total_value += value;
        positions.insert(
            symbol.clone(),
            PositionView {
                amount: position.amount,
                value,
                price,
                pnl_percent,
            },
        );
    }

    PortfolioState {
        cash: session.cash,
        total_value,
        positions,
    }
}

/// Close of the candle at `time_index - 1`, the latest one the player
/// has seen. Zero before the first reveal; never a future price.
pub(crate) fn last_revealed_close(session: &Session, scenario: &Scenario, symbol: &str) -> f64 {
    if session.time_index == 0 {
        return 0.0;
    }
    scenario
        .candle(symbol, session.time_index - 1)
        .map(|c| c.close)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Position, Session};
    use uuid::Uuid;

    fn session_with(symbol: &str, cash: f64, position: Position) -> Session {
        let mut session = Session::create(Uuid::new_v4(), "tester");
        session.cash = cash;
        session.positions.insert(symbol.to_string(), position);
        session
    }

    #[test]
    fn test_pnl_zero_without_cost_basis() {
        let scenario = Scenario::fixture(&[("BTC", &[100.0, 110.0])], 2);
        let mut session = session_with("BTC", 10_000.0, Position::default());
        session.time_index = 2;

        let state = valuate(&session, &scenario);
        assert_eq!(state.positions["BTC"].pnl_percent, 0.0);
        assert_eq!(state.total_value, 10_000.0);
    }

    #[test]
    fn test_valuation_uses_last_revealed_close() {
        let scenario = Scenario::fixture(&[("BTC", &[100.0, 200.0, 400.0])], 3);
        let mut session = session_with(
            "BTC",
            0.0,
            Position {
                amount: 1.0,
                cost_basis: 100.0,
            },
        );

        // Two candles revealed: the live price is the second close, not
        // the unrevealed third.
        session.time_index = 2;
        let state = valuate(&session, &scenario);
        assert_eq!(state.positions["BTC"].price, 200.0);
        assert_eq!(state.positions["BTC"].value, 200.0);
        assert_eq!(state.positions["BTC"].pnl_percent, 100.0);
        assert_eq!(state.total_value, 200.0);
    }

    #[test]
    fn test_no_price_before_first_reveal() {
        let scenario = Scenario::fixture(&[("BTC", &[100.0])], 1);
        let session = session_with("BTC", 500.0, Position::default());

        let state = valuate(&session, &scenario);
        assert_eq!(state.positions["BTC"].price, 0.0);
        assert_eq!(state.total_value, 500.0);
    }
}
