//! Trade execution.
//!
//! Orders are cash-denominated and fill at the close of the most
//! recently revealed candle, never at a caller-supplied price and never
//! at a future one. A rejected order leaves the session untouched.

use serde::{Deserialize, Serialize};

use crate::config::{DUST_THRESHOLD, SELL_TOLERANCE};
use crate::error::GameError;
use crate::scenario::Scenario;
use crate::session::{Position, Session};
use crate::valuation::last_revealed_close;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "BUY"),
            TradeSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Apply one order to the session at the current price.
///
/// Cash and position change by exactly offsetting amounts at the fill
/// price; the trade itself neither creates nor destroys value. All
/// checks run before any mutation, so an error means nothing moved.
pub fn execute_trade(
    session: &mut Session,
    scenario: &Scenario,
    instrument: &str,
    side: TradeSide,
    cash_amount: f64,
) -> Result<(), GameError> {
    if !cash_amount.is_finite() || cash_amount <= 0.0 {
        return Err(GameError::InvalidTradeAmount);
    }
    let held = *session
        .positions
        .get(instrument)
        .filter(|_| scenario.contains(instrument))
        .ok_or_else(|| GameError::UnknownInstrument(instrument.to_string()))?;

    let price = last_revealed_close(session, scenario, instrument);
    if price <= 0.0 {
        return Err(GameError::NoActivePriceYet);
    }

    let next = match side {
        TradeSide::Buy => {
            if cash_amount > session.cash {
                return Err(GameError::InsufficientFunds {
                    requested: cash_amount,
                    available: session.cash,
                });
            }
            session.cash -= cash_amount;
            Position {
                amount: held.amount + cash_amount / price,
                cost_basis: held.cost_basis + cash_amount,
            }
        }
        TradeSide::Sell => {
            let quantity = cash_amount / price;
            if quantity > held.amount * (1.0 + SELL_TOLERANCE) {
                return Err(GameError::InsufficientHoldings {
                    requested_qty: quantity,
                    held: held.amount,
                });
            }
            let quantity = quantity.min(held.amount);
            session.cash += cash_amount;
            let next = Position {
                amount: held.amount - quantity,
                cost_basis: held.cost_basis * (1.0 - quantity / held.amount),
            };
            if next.amount < DUST_THRESHOLD {
                Position::default()
            } else {
                next
            }
        }
    };
    session.positions.insert(instrument.to_string(), next);

    tracing::debug!(
        owner = %session.owner_id,
        instrument,
        %side,
        cash_amount,
        price,
        "trade executed"
    );
    Ok(())
}
