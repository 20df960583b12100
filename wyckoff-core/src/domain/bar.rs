//! Bar: the fundamental market data unit.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while normalizing raw rows into bars.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarError {
    #[error("non-finite {field} on {date}")]
    NonFinite { date: NaiveDate, field: &'static str },
}

/// One OHLCV row as read from disk, before derived fields are computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Normalized OHLCV bar for a single symbol on a single day.
///
/// `true_range` is the plain bar range `|high - low|` (no gap component).
/// `close_position` locates the close inside that range, 0.0 at the low and
/// 1.0 at the high; it is `None` for a zero-range bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub true_range: f64,
    pub close_position: Option<f64>,
}

impl Bar {
    /// Derive true range and close position from a raw row.
    pub fn from_raw(raw: &RawBar) -> Self {
        let range = raw.high - raw.low;
        let close_position = if range > 0.0 {
            Some((raw.close - raw.low) / range)
        } else {
            None
        };
        Self {
            date: raw.date,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume,
            true_range: range.abs(),
            close_position,
        }
    }

    /// Basic OHLC sanity check: high >= low, high >= open/close, low <= open/close.
    pub fn is_sane(&self) -> bool {
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= 0.0
    }
}

impl RawBar {
    fn check_finite(&self) -> Result<(), BarError> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(BarError::NonFinite {
                    date: self.date,
                    field,
                });
            }
        }
        Ok(())
    }
}

/// Sort raw rows by date (stable) and derive the per-bar fields.
///
/// Rejects rows carrying NaN or infinite prices/volume: those are schema
/// errors and must never reach the detector.
pub fn normalize(mut raws: Vec<RawBar>) -> Result<Vec<Bar>, BarError> {
    raws.sort_by_key(|r| r.date);
    raws.iter()
        .map(|raw| {
            raw.check_finite()?;
            Ok(Bar::from_raw(raw))
        })
        .collect()
}
