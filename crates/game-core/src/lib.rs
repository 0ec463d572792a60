//! Game Core
//!
//! The per-session market-replay and trading engine: deterministic daily
//! scenario selection, the time-advancing replay loop, and the trade
//! execution / valuation logic. Transport and persistence stay behind the
//! seam traits in [`events`]; this crate never touches a socket or a
//! database.

pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod replay;
pub mod scenario;
pub mod session;
pub mod valuation;

pub use error::GameError;
pub use events::{EventSink, GameEvent, ScoreStore};
pub use ledger::TradeSide;
pub use replay::{spawn_session, SessionCommand, SessionHandle};
pub use scenario::{sample, Scenario};
pub use session::{Position, ReplayState, Session};
pub use valuation::{valuate, PortfolioState, PositionView};
