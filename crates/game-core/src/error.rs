use market_data::MarketDataError;
use thiserror::Error;

/// Everything that can go wrong while setting up or playing a session.
///
/// Scenario-construction failures abort the start attempt; trade
/// rejections leave the session exactly as it was. All of these surface
/// to the player as an `error` event, never as a dropped connection.
#[derive(Error, Debug)]
pub enum GameError {
    #[error(transparent)]
    DataUnavailable(#[from] MarketDataError),

    #[error("not enough history to build a scenario from the selected instruments")]
    InsufficientHistory,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("{0} is not part of this game")]
    UnknownInstrument(String),

    #[error("no price has been revealed yet")]
    NoActivePriceYet,

    #[error("trade amount must be a positive number")]
    InvalidTradeAmount,

    #[error("insufficient funds: order {requested:.2}, cash {available:.2}")]
    InsufficientFunds { requested: f64, available: f64 },

    #[error("insufficient holdings: order {requested_qty:.8}, held {held:.8}")]
    InsufficientHoldings { requested_qty: f64, held: f64 },
}
