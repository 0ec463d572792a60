//! Daily scenario selection.
//!
//! The sampler turns a calendar date into the day's puzzle: which
//! instruments a session plays and which contiguous window of each
//! series it replays. Everyone who starts a game on the same day against
//! the same catalog gets the same scenario.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use market_data::{Candle, MarketCatalog};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::GameError;

/// One instrument's slice of the day's scenario: a shared handle to the
/// full catalog series plus the window start. The series is never copied.
#[derive(Clone, Debug)]
pub struct ScenarioLeg {
    series: Arc<Vec<Candle>>,
    start: usize,
}

/// The fixed-length slice of history a session plays through.
#[derive(Clone, Debug)]
pub struct Scenario {
    legs: BTreeMap<String, ScenarioLeg>,
    length: usize,
}

impl Scenario {
    /// Candles per instrument in this scenario.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.legs.contains_key(symbol)
    }

    /// Instrument symbols in stable (sorted) order.
    pub fn instruments(&self) -> impl Iterator<Item = &String> {
        self.legs.keys()
    }

    /// The candle at scenario-relative `index`, or `None` past the end.
    pub fn candle(&self, symbol: &str, index: usize) -> Option<Candle> {
        if index >= self.length {
            return None;
        }
        let leg = self.legs.get(symbol)?;
        leg.series.get(leg.start + index).copied()
    }

    /// A scenario-relative sub-window, used for the opening history
    /// snapshot. `end` is exclusive and must not exceed the length.
    pub fn window(&self, symbol: &str, end: usize) -> Option<&[Candle]> {
        if end > self.length {
            return None;
        }
        let leg = self.legs.get(symbol)?;
        leg.series.get(leg.start..leg.start + end)
    }

    #[cfg(test)]
    pub(crate) fn fixture(closes_by_symbol: &[(&str, &[f64])], length: usize) -> Scenario {
        let legs = closes_by_symbol
            .iter()
            .map(|(symbol, closes)| {
                let series: Vec<Candle> = closes
                    .iter()
                    .enumerate()
                    .map(|(i, close)| Candle {
                        time: 1_600_000_000 + i as i64 * 3600,
                        open: *close,
                        high: *close,
                        low: *close,
                        close: *close,
                    })
                    .collect();
                (
                    symbol.to_string(),
                    ScenarioLeg {
                        series: Arc::new(series),
                        start: 0,
                    },
                )
            })
            .collect();
        Scenario { legs, length }
    }
}

/// Build the scenario for `date_key`.
///
/// Randomness is a locally seeded [`StdRng`] derived from the date alone,
/// so repeated calls on the same day pick the same instrument subset and
/// the same window offsets, and no process-wide random state is touched.
/// Instruments whose series are missing or shorter than `window_length`
/// are skipped; the sample only fails when nothing playable remains.
pub fn sample(
    date_key: NaiveDate,
    catalog: &MarketCatalog,
    requested: &[String],
    window_length: usize,
    max_instruments: usize,
) -> Result<Scenario, GameError> {
    let mut pool: Vec<String> = if requested.is_empty() {
        catalog.available()?
    } else {
        requested.iter().map(|s| s.trim().to_uppercase()).collect()
    };
    // The candidate order must not depend on caller whims or directory
    // iteration order, only on the seeded shuffle below.
    pool.sort();
    pool.dedup();

    let mut rng = StdRng::seed_from_u64(date_key.num_days_from_ce() as u64);
    pool.shuffle(&mut rng);

    let mut legs = BTreeMap::new();
    for symbol in pool {
        if legs.len() >= max_instruments {
            break;
        }
        let series = match catalog.load(&symbol) {
            Ok(series) => series,
            Err(err) => {
                tracing::warn!(%symbol, error = %err, "skipping instrument");
                continue;
            }
        };
        if series.len() < window_length {
            tracing::warn!(
                %symbol,
                len = series.len(),
                need = window_length,
                "series too short for scenario, skipping"
            );
            continue;
        }
        let start = rng.gen_range(0..=series.len() - window_length);
        legs.insert(symbol, ScenarioLeg { series, start });
    }

    if legs.is_empty() {
        return Err(GameError::InsufficientHistory);
    }
    Ok(Scenario {
        legs,
        length: window_length,
    })
}
