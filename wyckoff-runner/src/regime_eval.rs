//! Forward returns by daily regime.
//!
//! Every bar gets forward returns for each window; bars are then grouped by
//! their daily regime label and summarized per (regime, window). A pairwise
//! table reports each regime's difference from a baseline regime.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use wyckoff_core::domain::{Bar, Regime};

use crate::forward::{forward_return, quantile};

/// Forward returns for one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForward {
    pub date: NaiveDate,
    /// `(window, return)` pairs in ascending window order.
    pub returns: Vec<(usize, Option<f64>)>,
}

impl DailyForward {
    pub fn get(&self, window: usize) -> Option<f64> {
        self.returns
            .iter()
            .find(|(w, _)| *w == window)
            .and_then(|(_, r)| *r)
    }
}

/// One row per bar, in bar order.
pub fn add_forward_returns_daily(bars: &[Bar], windows: &[usize]) -> Vec<DailyForward> {
    let mut windows = windows.to_vec();
    windows.sort_unstable();
    windows.dedup();

    bars.iter()
        .enumerate()
        .map(|(i, bar)| DailyForward {
            date: bar.date,
            returns: windows
                .iter()
                .map(|&w| (w, forward_return(bars, i, w)))
                .collect(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeSummaryRow {
    pub regime: Regime,
    pub window: usize,
    /// Defined returns in the group.
    pub count: usize,
    pub median: Option<f64>,
    pub win_rate: Option<f64>,
    pub p5: Option<f64>,
}

/// Summarize `(regime, forward row)` pairs per window, then per regime.
///
/// Windows come out ascending and regimes in `Regime::ALL` order; a regime
/// with no rows at all is left out.
pub fn summarize_regimes<'a, I>(pairs: I, windows: &[usize]) -> Vec<RegimeSummaryRow>
where
    I: IntoIterator<Item = (Regime, &'a DailyForward)>,
{
    let pairs: Vec<(Regime, &DailyForward)> = pairs.into_iter().collect();
    let mut windows = windows.to_vec();
    windows.sort_unstable();
    windows.dedup();

    let regimes: Vec<Regime> = Regime::ALL
        .into_iter()
        .filter(|r| pairs.iter().any(|(p, _)| p == r))
        .collect();

    let mut out = Vec::new();
    for &window in &windows {
        for &regime in &regimes {
            let mut values: Vec<f64> = pairs
                .iter()
                .filter(|(r, _)| *r == regime)
                .filter_map(|(_, f)| f.get(window))
                .collect();
            values.sort_by(f64::total_cmp);
            let win_rate = (!values.is_empty())
                .then(|| values.iter().filter(|&&v| v > 0.0).count() as f64 / values.len() as f64);
            out.push(RegimeSummaryRow {
                regime,
                window,
                count: values.len(),
                median: quantile(&values, 0.5),
                win_rate,
                p5: quantile(&values, 0.05),
            });
        }
    }
    out
}

/// A summary row minus the baseline regime's row for the same window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineDelta {
    pub regime: Regime,
    pub window: usize,
    pub baseline_regime: Regime,
    pub median_delta: Option<f64>,
    pub win_rate_delta: Option<f64>,
    pub p5_delta: Option<f64>,
}

/// One delta row per summary row. Deltas are `None` when either side is
/// undefined or the baseline has no row for that window.
pub fn pairwise_vs_baseline(summary: &[RegimeSummaryRow], baseline: Regime) -> Vec<BaselineDelta> {
    let diff = |a: Option<f64>, b: Option<f64>| Some(a? - b?);
    summary
        .iter()
        .map(|row| {
            let base = summary
                .iter()
                .find(|b| b.regime == baseline && b.window == row.window);
            BaselineDelta {
                regime: row.regime,
                window: row.window,
                baseline_regime: baseline,
                median_delta: base.and_then(|b| diff(row.median, b.median)),
                win_rate_delta: base.and_then(|b| diff(row.win_rate, b.win_rate)),
                p5_delta: base.and_then(|b| diff(row.p5, b.p5)),
            }
        })
        .collect()
}
