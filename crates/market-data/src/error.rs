use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("no historical data for {0}")]
    SeriesMissing(String),

    #[error("corrupt series for {symbol}: {reason}")]
    SeriesCorrupt { symbol: String, reason: String },

    #[error("series for {symbol} has {len} candles, need at least {min}")]
    SeriesTooShort {
        symbol: String,
        len: usize,
        min: usize,
    },

    #[error("cannot read data directory {0}")]
    DataDirUnreadable(String),
}
