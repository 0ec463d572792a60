//! Seams to the outside world.
//!
//! The engine talks to its collaborators through two narrow traits: a
//! fire-and-forget event sink (the transport layer drains it to the
//! player) and an async score store (the persistence layer). Both are
//! best-effort from the engine's point of view; neither may block a
//! session's replay loop on another component's health.

use async_trait::async_trait;
use market_data::Candle;
use serde::Serialize;

use crate::valuation::PortfolioState;

/// Outbound, per-session addressed payloads. Serialized as
/// internally-tagged JSON, e.g. `{"type":"candle","instrument":"BTC",...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    AvailableInstruments {
        instruments: Vec<String>,
    },
    /// One-time opening snapshot for one instrument.
    History {
        instrument: String,
        candles: Vec<Candle>,
    },
    /// One newly revealed candle.
    Candle {
        instrument: String,
        candle: Candle,
    },
    PortfolioState(PortfolioState),
    GameOver {
        final_value: f64,
        pnl_percent: f64,
    },
    Error {
        message: String,
    },
}

/// Push-only delivery of events to a session's owner. Implementations
/// must not block; delivery is best-effort.
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: GameEvent);
}

/// Persistence of final scores. Failure is the caller's to log; it never
/// rolls back a settlement.
#[async_trait]
pub trait ScoreStore: Send + Sync + 'static {
    async fn save(
        &self,
        player_name: &str,
        final_value: f64,
        instruments: &[String],
    ) -> anyhow::Result<()>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_with_type_tag() {
        let event = GameEvent::GameOver {
            final_value: 12_345.67,
            pnl_percent: 23.4567,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "game_over");
        assert_eq!(json["final_value"], 12_345.67);

        let event = GameEvent::Error {
            message: "insufficient funds".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
    }

    #[test]
    fn test_candle_event_wire_shape() {
        let event = GameEvent::Candle {
            instrument: "BTC".to_string(),
            candle: Candle {
                time: 1_700_000_000,
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "candle");
        assert_eq!(json["instrument"], "BTC");
        assert_eq!(json["candle"]["time"], 1_700_000_000i64);
        assert_eq!(json["candle"]["close"], 1.5);
    }
}
