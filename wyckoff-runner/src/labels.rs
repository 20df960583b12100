//! Sparse labels derived from a symbol's event table and daily regimes.
//!
//! - Regime transitions: the first day of a new regime, emitted only for the
//!   cycle ACCUMULATION -> MARKUP -> DISTRIBUTION -> MARKDOWN -> ACCUMULATION
//!   and only once the prior regime has lasted `min_prior_bars` rows.
//! - Event sequences: ordered event patterns completed within a day gap.
//! - Event context: the daily regime a few rows before each event.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use wyckoff_core::classify::DailyRegime;
use wyckoff_core::domain::{Event, EventLabel, Regime};

pub const DEFAULT_TRANSITION_MIN_PRIOR_BARS: usize = 5;
pub const DEFAULT_SEQUENCE_MAX_GAP_DAYS: i64 = 30;
pub const DEFAULT_PRIOR_REGIME_LOOKBACK: usize = 1;

// ─── Regime transitions ─────────────────────────────────────────────

const CYCLE: [(Regime, Regime); 4] = [
    (Regime::Accumulation, Regime::Markup),
    (Regime::Markup, Regime::Distribution),
    (Regime::Distribution, Regime::Markdown),
    (Regime::Markdown, Regime::Accumulation),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegimeTransition {
    /// First day of the new regime.
    pub date: NaiveDate,
    pub from: Regime,
    pub to: Regime,
}

impl RegimeTransition {
    /// `"FROM->TO"`, e.g. `"ACCUMULATION->MARKUP"`.
    pub fn label(&self) -> String {
        format!("{}->{}", self.from, self.to)
    }
}

/// Transitions along the Wyckoff cycle in a date-sorted daily table.
///
/// `min_prior_bars` below 1 is treated as 1.
pub fn label_regime_transitions(
    daily: &[DailyRegime],
    min_prior_bars: usize,
) -> Vec<RegimeTransition> {
    let min_prior = min_prior_bars.max(1);
    let mut out = Vec::new();
    let Some(first) = daily.first() else {
        return out;
    };

    let mut prior = first.regime;
    let mut held = 1usize;
    for day in &daily[1..] {
        if day.regime == prior {
            held += 1;
            continue;
        }
        if held >= min_prior && CYCLE.contains(&(prior, day.regime)) {
            out.push(RegimeTransition {
                date: day.date,
                from: prior,
                to: day.regime,
            });
        }
        prior = day.regime;
        held = 1;
    }
    out
}

// ─── Event sequences ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SequenceId {
    AccumBreakout,
    DistributionTop,
    MarkdownStart,
    FailedAccum,
    Recovery,
}

impl SequenceId {
    pub const ALL: [SequenceId; 5] = [
        SequenceId::AccumBreakout,
        SequenceId::DistributionTop,
        SequenceId::MarkdownStart,
        SequenceId::FailedAccum,
        SequenceId::Recovery,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SequenceId::AccumBreakout => "SEQ_ACCUM_BREAKOUT",
            SequenceId::DistributionTop => "SEQ_DISTRIBUTION_TOP",
            SequenceId::MarkdownStart => "SEQ_MARKDOWN_START",
            SequenceId::FailedAccum => "SEQ_FAILED_ACCUM",
            SequenceId::Recovery => "SEQ_RECOVERY",
        }
    }

    /// Events that must appear in order.
    pub fn pattern(self) -> &'static [EventLabel] {
        use EventLabel::*;
        match self {
            SequenceId::AccumBreakout => &[Sc, Ar, Spring, Sos],
            SequenceId::DistributionTop => &[Bc, ArTop],
            SequenceId::MarkdownStart => &[Bc, ArTop, Sow],
            SequenceId::FailedAccum => &[Sc, Ar, Spring],
            SequenceId::Recovery => &[Sow, Sc],
        }
    }
}

/// One completed sequence, dated at its final event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceEvent {
    pub date: NaiveDate,
    pub sequence: SequenceId,
}

type Timeline = [(NaiveDate, EventLabel)];

fn within(timeline: &Timeline, start: NaiveDate, idx: usize, max_gap: i64) -> bool {
    (timeline[idx].0 - start).num_days() <= max_gap
}

fn next_of(timeline: &Timeline, from: usize, label: EventLabel) -> Option<usize> {
    (from..timeline.len()).find(|&j| timeline[j].1 == label)
}

/// Positions where `pattern` completes. Each step takes the first matching
/// event after the previous step; after a match the search resumes past it.
fn pattern_ends(timeline: &Timeline, pattern: &[EventLabel], max_gap: i64) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut i = 0;
    while i < timeline.len() {
        let (start, label) = timeline[i];
        if label != pattern[0] {
            i += 1;
            continue;
        }
        let mut at = Some(i);
        for &step in &pattern[1..] {
            at = at
                .and_then(|cur| next_of(timeline, cur + 1, step))
                .filter(|&j| within(timeline, start, j, max_gap));
        }
        match at {
            Some(end) => {
                ends.push(end);
                i = end + 1;
            }
            None => i += 1,
        }
    }
    ends
}

/// SC, AR, SPRING within the gap with no SOS inside the gap; dated at the spring.
fn failed_accum_ends(timeline: &Timeline, max_gap: i64) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut i = 0;
    while i < timeline.len() {
        let (start, label) = timeline[i];
        if label != EventLabel::Sc {
            i += 1;
            continue;
        }
        let spring = next_of(timeline, i + 1, EventLabel::Ar)
            .filter(|&ar| within(timeline, start, ar, max_gap))
            .and_then(|ar| next_of(timeline, ar + 1, EventLabel::Spring))
            .filter(|&sp| within(timeline, start, sp, max_gap));
        let Some(spring) = spring else {
            i += 1;
            continue;
        };
        let confirmed = timeline[spring + 1..]
            .iter()
            .take_while(|(date, _)| (*date - start).num_days() <= max_gap)
            .any(|(_, l)| *l == EventLabel::Sos);
        if !confirmed {
            ends.push(spring);
        }
        i = spring + 1;
    }
    ends
}

/// Completed sequences, sorted by date then sequence name.
///
/// Events are stably ordered by date first; `max_gap_days` below 1 is
/// treated as 1 and is measured from the first event of the pattern.
pub fn label_event_sequences(events: &[Event], max_gap_days: i64) -> Vec<SequenceEvent> {
    let max_gap = max_gap_days.max(1);
    let mut timeline: Vec<(NaiveDate, EventLabel)> =
        events.iter().map(|e| (e.date, e.label)).collect();
    timeline.sort_by_key(|(date, _)| *date);

    let mut out = Vec::new();
    for sequence in SequenceId::ALL {
        let ends = match sequence {
            SequenceId::FailedAccum => failed_accum_ends(&timeline, max_gap),
            _ => pattern_ends(&timeline, sequence.pattern(), max_gap),
        };
        out.extend(ends.into_iter().map(|idx| SequenceEvent {
            date: timeline[idx].0,
            sequence,
        }));
    }
    out.sort_by(|a, b| (a.date, a.sequence.as_str()).cmp(&(b.date, b.sequence.as_str())));
    out
}

// ─── Event context ──────────────────────────────────────────────────

/// An event with the daily regime `lookback` rows before its date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    pub date: NaiveDate,
    pub label: EventLabel,
    /// `None` when the event is too early or its date is not in the table.
    pub prior_regime: Option<Regime>,
}

/// Attach the prior daily regime to each event, keeping event order.
///
/// When a date appears more than once in `daily` the first row is used.
pub fn attach_prior_regime(
    events: &[Event],
    daily: &[DailyRegime],
    lookback: usize,
) -> Vec<EventContext> {
    let lookback = lookback.max(1);
    events
        .iter()
        .map(|e| {
            let prior_regime = daily
                .iter()
                .position(|d| d.date == e.date)
                .and_then(|p| p.checked_sub(lookback))
                .map(|p| daily[p].regime);
            EventContext {
                date: e.date,
                label: e.label,
                prior_regime,
            }
        })
        .collect()
}
