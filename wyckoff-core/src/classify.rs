//! Daily regime classification from a finished event table.
//!
//! Unlike the incremental regime machine this has no guards: each day takes
//! the regime implied by its own events, and days without a mapped event
//! inherit the previous day's label.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{Event, EventLabel, Regime};

/// Same-day resolution order; a later entry overrides an earlier one.
pub const DAILY_PRIORITY: [EventLabel; 6] = [
    EventLabel::Sc,
    EventLabel::Spring,
    EventLabel::Sos,
    EventLabel::Bc,
    EventLabel::Ut,
    EventLabel::Sow,
];

/// Regime implied by a single event, `None` for AR / AR_TOP.
pub fn daily_regime_of(label: EventLabel) -> Option<Regime> {
    match label {
        EventLabel::Sc | EventLabel::Spring => Some(Regime::Accumulation),
        EventLabel::Sos => Some(Regime::Markup),
        EventLabel::Bc | EventLabel::Ut => Some(Regime::Distribution),
        EventLabel::Sow => Some(Regime::Markdown),
        EventLabel::Ar | EventLabel::ArTop => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRegime {
    pub date: NaiveDate,
    pub regime: Regime,
}

/// Label every date with a regime derived from `events`.
///
/// Returns one row per entry of `dates`, stably sorted; a repeated date gets
/// one row per repeat, each carrying that day's regime. Events dated on a day
/// that is not in `dates` are ignored.
pub fn classify_daily(dates: &[NaiveDate], events: &[Event]) -> Vec<DailyRegime> {
    let mut days = dates.to_vec();
    days.sort();

    let mut by_date: HashMap<NaiveDate, [bool; 8]> = HashMap::new();
    for ev in events {
        by_date.entry(ev.date).or_default()[ev.label.index()] = true;
    }

    let mut regime = Regime::Unknown;
    days.into_iter()
        .map(|date| {
            if let Some(seen) = by_date.get(&date) {
                for label in DAILY_PRIORITY {
                    if seen[label.index()] {
                        if let Some(r) = daily_regime_of(label) {
                            regime = r;
                        }
                    }
                }
            }
            DailyRegime { date, regime }
        })
        .collect()
}

/// A contiguous run of days sharing one known regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSegment {
    pub regime: Regime,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub bars: usize,
}

/// Collapse daily labels into phases, dropping UNKNOWN runs and runs shorter
/// than `min_phase_bars`.
pub fn phase_segments(daily: &[DailyRegime], min_phase_bars: usize) -> Vec<PhaseSegment> {
    let mut out = Vec::new();
    let mut current: Option<PhaseSegment> = None;

    for day in daily {
        match current.as_mut() {
            Some(seg) if seg.regime == day.regime => {
                seg.end = day.date;
                seg.bars += 1;
            }
            _ => {
                out.extend(current.take());
                current = Some(PhaseSegment {
                    regime: day.regime,
                    start: day.date,
                    end: day.date,
                    bars: 1,
                });
            }
        }
    }
    out.extend(current);

    out.retain(|seg| seg.regime != Regime::Unknown && seg.bars >= min_phase_bars);
    out
}
