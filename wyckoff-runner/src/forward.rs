//! Forward-return statistics per event label.
//!
//! For an event on bar `i`, `fwd_w = close[i + w] / close[i] - 1`, undefined
//! when `i + w` runs past the end of the series. Summary statistics are taken
//! over the 20-bar window.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use wyckoff_core::domain::{Bar, Event, EventLabel};

use crate::config::SUMMARY_WINDOW;

/// One event with its forward returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardRow {
    pub symbol: String,
    pub event: Event,
    /// `(window, return)` pairs in ascending window order.
    pub returns: Vec<(usize, Option<f64>)>,
}

impl ForwardRow {
    pub fn get(&self, window: usize) -> Option<f64> {
        self.returns
            .iter()
            .find(|(w, _)| *w == window)
            .and_then(|(_, r)| *r)
    }
}

/// Attach forward returns to each event. Rows come back in date order.
pub fn add_forward_returns(
    symbol: &str,
    events: &[Event],
    bars: &[Bar],
    windows: &[usize],
) -> Vec<ForwardRow> {
    let mut windows = windows.to_vec();
    windows.sort_unstable();
    windows.dedup();

    let mut rows: Vec<ForwardRow> = events
        .iter()
        .map(|ev| ForwardRow {
            symbol: symbol.to_string(),
            event: ev.clone(),
            returns: windows
                .iter()
                .map(|&w| (w, forward_return(bars, ev.index, w)))
                .collect(),
        })
        .collect();
    rows.sort_by_key(|r| r.event.date);
    rows
}

pub(crate) fn forward_return(bars: &[Bar], index: usize, window: usize) -> Option<f64> {
    let base = bars.get(index)?.close;
    let later = bars.get(index + window)?.close;
    let r = later / base - 1.0;
    r.is_finite().then_some(r)
}

/// Years spanned by a series: `max(1, days) / 365.25`, or 0 when empty.
pub fn coverage_years(bars: &[Bar]) -> f64 {
    match (bars.first(), bars.last()) {
        (Some(first), Some(last)) => {
            let days = (last.date - first.date).num_days().max(1);
            days as f64 / 365.25
        }
        _ => 0.0,
    }
}

/// Per-label summary row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub event: EventLabel,
    /// Events per year of coverage.
    pub density: Option<f64>,
    pub median_fwd_20: Option<f64>,
    pub win_rate_20: Option<f64>,
    pub p5_fwd_20: Option<f64>,
    /// Median fwd_20 of the later half minus that of the earlier half.
    pub stability_delta: Option<f64>,
    pub event_count: usize,
}

/// Summarize forward rows per event label, sorted by label name.
pub fn summarize(rows: &[ForwardRow], coverage_years: f64) -> Vec<SummaryRow> {
    let mut labels: Vec<EventLabel> = EventLabel::ALL
        .into_iter()
        .filter(|l| rows.iter().any(|r| r.event.label == *l))
        .collect();
    labels.sort_by_key(|l| l.as_str());

    labels
        .into_iter()
        .map(|label| {
            let group: Vec<&ForwardRow> = rows.iter().filter(|r| r.event.label == label).collect();
            let mut fwd: Vec<f64> = group.iter().filter_map(|r| r.get(SUMMARY_WINDOW)).collect();
            fwd.sort_by(f64::total_cmp);

            let win_rate = (!fwd.is_empty())
                .then(|| fwd.iter().filter(|&&r| r > 0.0).count() as f64 / fwd.len() as f64);

            SummaryRow {
                event: label,
                density: (coverage_years != 0.0).then(|| group.len() as f64 / coverage_years),
                median_fwd_20: quantile(&fwd, 0.5),
                win_rate_20: win_rate,
                p5_fwd_20: quantile(&fwd, 0.05),
                stability_delta: stability_delta(&group),
                event_count: group.len(),
            }
        })
        .collect()
}

/// Linear-interpolated quantile of sorted values.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

fn median(values: &mut [f64]) -> Option<f64> {
    values.sort_by(f64::total_cmp);
    quantile(values, 0.5)
}

/// Split at the date midpoint: dates at or before it are the first half.
fn stability_delta(group: &[&ForwardRow]) -> Option<f64> {
    let dates: Vec<NaiveDate> = group.iter().map(|r| r.event.date).collect();
    let t_min = *dates.iter().min()?;
    let t_max = *dates.iter().max()?;
    let span = (t_max - t_min).num_days();

    let (mut first, mut second) = (Vec::new(), Vec::new());
    for row in group {
        let Some(r) = row.get(SUMMARY_WINDOW) else {
            continue;
        };
        if (row.event.date - t_min).num_days() * 2 <= span {
            first.push(r);
        } else {
            second.push(r);
        }
    }
    Some(median(&mut second)? - median(&mut first)?)
}
