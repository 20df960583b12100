//! Structural events emitted by the detector.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The eight structural event kinds, in cascade priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventLabel {
    /// Selling climax.
    Sc,
    /// Buying climax.
    Bc,
    /// Automatic rally after a selling climax.
    Ar,
    /// Automatic reaction after a buying climax.
    ArTop,
    /// False breakdown below support that reclaims it.
    Spring,
    /// Upthrust: false breakout above resistance that falls back.
    Ut,
    /// Sign of strength.
    Sos,
    /// Sign of weakness.
    Sow,
}

impl EventLabel {
    pub const ALL: [EventLabel; 8] = [
        EventLabel::Sc,
        EventLabel::Bc,
        EventLabel::Ar,
        EventLabel::ArTop,
        EventLabel::Spring,
        EventLabel::Ut,
        EventLabel::Sos,
        EventLabel::Sow,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventLabel::Sc => "SC",
            EventLabel::Bc => "BC",
            EventLabel::Ar => "AR",
            EventLabel::ArTop => "AR_TOP",
            EventLabel::Spring => "SPRING",
            EventLabel::Ut => "UT",
            EventLabel::Sos => "SOS",
            EventLabel::Sow => "SOW",
        }
    }

    /// Dense index, usable for fixed-size per-label tables.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EventLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown event label in text input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event label '{0}'")]
pub struct UnknownLabel(pub String);

impl FromStr for EventLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        EventLabel::ALL
            .into_iter()
            .find(|label| label.as_str() == upper)
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

/// A detected event: the bar it is dated at, its label and its score.
///
/// `index` is the zero-based position of the dated bar in the symbol's
/// series. For a Spring/Upthrust confirmed on a later bar, both `index`
/// and `date` still point at the breakout bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub index: usize,
    pub date: NaiveDate,
    pub label: EventLabel,
    pub score: f64,
}
