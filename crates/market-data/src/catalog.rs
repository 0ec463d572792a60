//! CSV-backed market catalog.
//!
//! Candle files live in a flat data directory, one file per instrument
//! named `{SYMBOL}_1h.csv` with `Datetime,Open,High,Low,Close,Volume`
//! columns (the layout the data miner writes). A series is parsed and
//! validated as a whole on first access, then cached behind an `Arc` so
//! every session shares the same immutable buffer.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::candle::Candle;
use crate::error::MarketDataError;

const SERIES_FILE_SUFFIX: &str = "_1h.csv";

pub struct MarketCatalog {
    data_dir: PathBuf,
    min_series_len: usize,
    series: RwLock<HashMap<String, Arc<Vec<Candle>>>>,
}

impl MarketCatalog {
    pub fn new(data_dir: impl Into<PathBuf>, min_series_len: usize) -> Self {
        Self {
            data_dir: data_dir.into(),
            min_series_len,
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Symbols with a candle file on disk, sorted. Presence of a file does
    /// not guarantee the series will load; `load` still validates it.
    pub fn available(&self) -> Result<Vec<String>, MarketDataError> {
        let entries = std::fs::read_dir(&self.data_dir)
            .map_err(|_| MarketDataError::DataDirUnreadable(self.data_dir.display().to_string()))?;

        let mut symbols: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter_map(|name| {
                name.strip_suffix(SERIES_FILE_SUFFIX)
                    .map(|s| s.to_uppercase())
            })
            .collect();
        symbols.sort();
        Ok(symbols)
    }

    /// Load the full candle series for `symbol`, reading it from disk on
    /// the first call and returning the cached buffer afterwards.
    /// Idempotent; never returns a partial series.
    pub fn load(&self, symbol: &str) -> Result<Arc<Vec<Candle>>, MarketDataError> {
        if let Some(series) = self.series.read().expect("catalog lock poisoned").get(symbol) {
            return Ok(Arc::clone(series));
        }

        let path = self.data_dir.join(format!("{symbol}{SERIES_FILE_SUFFIX}"));
        let file = File::open(&path).map_err(|_| {
            MarketDataError::SeriesMissing(symbol.to_string())
        })?;

        let candles = parse_series(symbol, file)?;
        if candles.len() < self.min_series_len {
            return Err(MarketDataError::SeriesTooShort {
                symbol: symbol.to_string(),
                len: candles.len(),
                min: self.min_series_len,
            });
        }

        tracing::debug!(symbol, candles = candles.len(), "loaded candle series");

        let series = Arc::new(candles);
        let mut cache = self.series.write().expect("catalog lock poisoned");
        // A concurrent loader may have won the race; keep whichever copy
        // is already published so all sessions share one buffer.
        let entry = cache
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::clone(&series));
        Ok(Arc::clone(entry))
    }
}

/// Parse a candle CSV, validating shape and chronological order.
fn parse_series<R: Read>(symbol: &str, input: R) -> Result<Vec<Candle>, MarketDataError> {
    let corrupt = |reason: String| MarketDataError::SeriesCorrupt {
        symbol: symbol.to_string(),
        reason,
    };

    let mut reader = csv::Reader::from_reader(input);
    let headers = reader
        .headers()
        .map_err(|e| corrupt(format!("unreadable header: {e}")))?
        .clone();

    let col = |names: &[&str]| -> Option<usize> {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
    };

    let time_col = col(&["Datetime", "Date", "time"])
        .ok_or_else(|| corrupt("missing time column".to_string()))?;
    let open_col = col(&["Open"]).ok_or_else(|| corrupt("missing Open column".to_string()))?;
    let high_col = col(&["High"]).ok_or_else(|| corrupt("missing High column".to_string()))?;
    let low_col = col(&["Low"]).ok_or_else(|| corrupt("missing Low column".to_string()))?;
    let close_col = col(&["Close"]).ok_or_else(|| corrupt("missing Close column".to_string()))?;

    let mut candles: Vec<Candle> = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| corrupt(format!("row {line}: {e}")))?;

        let field = |idx: usize| -> Result<&str, MarketDataError> {
            record
                .get(idx)
                .ok_or_else(|| corrupt(format!("row {line}: short record")))
        };
        let price = |idx: usize| -> Result<f64, MarketDataError> {
            field(idx)?
                .trim()
                .parse::<f64>()
                .map_err(|_| corrupt(format!("row {line}: bad price")))
        };

        let candle = Candle {
            time: parse_timestamp(field(time_col)?)
                .ok_or_else(|| corrupt(format!("row {line}: bad timestamp")))?,
            open: price(open_col)?,
            high: price(high_col)?,
            low: price(low_col)?,
            close: price(close_col)?,
        };

        if !candle.is_valid() {
            return Err(corrupt(format!("row {line}: invalid prices")));
        }
        if let Some(prev) = candles.last() {
            if candle.time <= prev.time {
                return Err(corrupt(format!("row {line}: timestamps not increasing")));
            }
        }
        candles.push(candle);
    }

    Ok(candles)
}

/// Accepts the timestamp flavors seen in the wild: RFC3339-ish with a
/// space separator and offset (what yfinance exports), the `T` variant,
/// a bare datetime treated as UTC, or a bare date at midnight.
fn parse_timestamp(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%z") {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().timestamp());
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc().timestamp());
    }
    None
}
