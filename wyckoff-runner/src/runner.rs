//! Multi-symbol runner: one detector per symbol, serial or on a rayon pool.
//!
//! Two entry points with identical output:
//! - `run_serial()`: symbols one after another on the calling thread.
//! - `run_parallel()`: symbols spread over a private rayon pool of
//!   `config.workers` threads.
//!
//! Results are always sorted by symbol. Symbols whose data fail to load are
//! logged and skipped; a run never aborts because of one bad partition.

use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use wyckoff_core::classify::{classify_daily, phase_segments, DailyRegime, PhaseSegment};
use wyckoff_core::detector::{BarRegime, DetectorError, IncrementalDetector};
use wyckoff_core::domain::{Bar, Event};

use crate::config::{ConfigError, RunConfig};
use crate::data_loader::{dataset_hash, BarSource, LoadError};
use crate::forward::{add_forward_returns, coverage_years, ForwardRow};
use crate::labels::{
    attach_prior_regime, label_event_sequences, label_regime_transitions, EventContext,
    RegimeTransition, SequenceEvent,
};
use crate::regime_eval::{
    add_forward_returns_daily, summarize_regimes, DailyForward, RegimeSummaryRow,
};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("detector failed on '{symbol}': {source}")]
    Detector {
        symbol: String,
        #[source]
        source: DetectorError,
    },
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Everything produced for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolResult {
    pub symbol: String,
    pub bar_count: usize,
    pub coverage_years: f64,
    pub dataset_hash: String,
    pub events: Vec<Event>,
    /// Regime after every bar, from the incremental machine.
    pub regimes: Vec<BarRegime>,
    /// Daily classification derived from the event table.
    pub daily: Vec<DailyRegime>,
    pub phases: Vec<PhaseSegment>,
    pub forward: Vec<ForwardRow>,
    /// Forward returns for every bar, aligned with `daily`.
    pub daily_forward: Vec<DailyForward>,
    pub transitions: Vec<RegimeTransition>,
    pub sequences: Vec<SequenceEvent>,
    pub event_context: Vec<EventContext>,
}

/// A symbol left out of a run, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skipped {
    pub symbol: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub results: Vec<SymbolResult>,
    pub skipped: Vec<Skipped>,
}

impl RunOutput {
    /// Total coverage across symbols, the denominator for event density.
    pub fn coverage_years(&self) -> f64 {
        self.results.iter().map(|r| r.coverage_years).sum()
    }

    pub fn event_count(&self) -> usize {
        self.results.iter().map(|r| r.events.len()).sum()
    }

    pub fn bar_count(&self) -> usize {
        self.results.iter().map(|r| r.bar_count).sum()
    }

    pub fn forward_rows(&self) -> impl Iterator<Item = &ForwardRow> {
        self.results.iter().flat_map(|r| r.forward.iter())
    }

    /// Per-regime forward statistics pooled across every symbol.
    pub fn regime_summary(&self, windows: &[usize]) -> Vec<RegimeSummaryRow> {
        let pairs = self.results.iter().flat_map(|r| {
            r.daily
                .iter()
                .zip(&r.daily_forward)
                .map(|(d, f)| (d.regime, f))
        });
        summarize_regimes(pairs, windows)
    }
}

/// Run the detector over one symbol's bars. No I/O.
pub fn process_symbol(
    symbol: &str,
    bars: &[Bar],
    config: &RunConfig,
) -> Result<SymbolResult, RunError> {
    let mut detector = IncrementalDetector::new(config.detector.clone())
        .map_err(|e| RunError::Config(e.into()))?;
    let output = detector.run(bars).map_err(|source| RunError::Detector {
        symbol: symbol.to_string(),
        source,
    })?;

    let dates: Vec<_> = bars.iter().map(|b| b.date).collect();
    let daily = classify_daily(&dates, &output.events);
    let phases = phase_segments(&daily, config.detector.min_phase_bars);
    let windows = config.windows();
    let forward = add_forward_returns(symbol, &output.events, bars, &windows);
    let daily_forward = add_forward_returns_daily(bars, &windows);
    let transitions = label_regime_transitions(&daily, config.transition_min_prior_bars);
    let sequences = label_event_sequences(&output.events, config.sequence_max_gap_days);
    let event_context = attach_prior_regime(&output.events, &daily, config.prior_regime_lookback);

    Ok(SymbolResult {
        symbol: symbol.to_string(),
        bar_count: bars.len(),
        coverage_years: coverage_years(bars),
        dataset_hash: dataset_hash(symbol, bars),
        events: output.events,
        regimes: output.regimes,
        daily,
        phases,
        forward,
        daily_forward,
        transitions,
        sequences,
        event_context,
    })
}

/// Load then process one symbol.
pub fn run_symbol(
    source: &dyn BarSource,
    symbol: &str,
    config: &RunConfig,
) -> Result<SymbolResult, RunError> {
    let bars = source.load(symbol)?;
    process_symbol(symbol, &bars, config)
}

fn selected_symbols(source: &dyn BarSource, config: &RunConfig) -> Result<Vec<String>, RunError> {
    let mut symbols = source.symbols()?;
    if config.symbol_limit > 0 {
        symbols.truncate(config.symbol_limit);
    }
    Ok(symbols)
}

fn collect(outcomes: Vec<(String, Result<SymbolResult, RunError>)>) -> RunOutput {
    let mut out = RunOutput::default();
    for (symbol, outcome) in outcomes {
        match outcome {
            Ok(result) => out.results.push(result),
            Err(e) => {
                log::warn!("skipping {symbol}: {e}");
                out.skipped.push(Skipped {
                    symbol,
                    reason: e.to_string(),
                });
            }
        }
    }
    out.results.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    out.skipped.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    out
}

pub fn run_serial(source: &dyn BarSource, config: &RunConfig) -> Result<RunOutput, RunError> {
    config.validate()?;
    let symbols = selected_symbols(source, config)?;
    let started = Instant::now();

    let outcomes: Vec<_> = symbols
        .iter()
        .map(|s| (s.clone(), run_symbol(source, s, config)))
        .collect();
    let out = collect(outcomes);

    log::info!(
        "serial run: {} symbols, {} events, {} skipped in {:.2?}",
        out.results.len(),
        out.event_count(),
        out.skipped.len(),
        started.elapsed()
    );
    Ok(out)
}

pub fn run_parallel(source: &dyn BarSource, config: &RunConfig) -> Result<RunOutput, RunError> {
    config.validate()?;
    let symbols = selected_symbols(source, config)?;
    let started = Instant::now();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers)
        .build()?;
    let outcomes: Vec<_> = pool.install(|| {
        symbols
            .par_iter()
            .map(|s| (s.clone(), run_symbol(source, s, config)))
            .collect()
    });
    let out = collect(outcomes);

    log::info!(
        "parallel run ({} workers): {} symbols, {} events, {} skipped in {:.2?}",
        config.workers,
        out.results.len(),
        out.event_count(),
        out.skipped.len(),
        started.elapsed()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_loader::SyntheticSource;
    use chrono::NaiveDate;

    fn source(symbols: &[&str]) -> SyntheticSource {
        SyntheticSource {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            start: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
            bars: 400,
        }
    }

    #[test]
    fn process_symbol_fills_every_table() {
        let src = source(&["SPY"]);
        let bars = src.load("SPY").unwrap();
        let result = process_symbol("SPY", &bars, &RunConfig::default()).unwrap();
        assert_eq!(result.bar_count, 400);
        assert_eq!(result.regimes.len(), 400);
        assert_eq!(result.daily.len(), 400);
        assert_eq!(result.forward.len(), result.events.len());
        assert_eq!(result.daily_forward.len(), 400);
        assert_eq!(result.event_context.len(), result.events.len());
        assert!(result.coverage_years > 1.0);
    }

    #[test]
    fn regime_summary_counts_every_defined_return() {
        let out = run_serial(&source(&["AAA", "BBB"]), &RunConfig::default()).unwrap();
        let summary = out.regime_summary(&[5]);
        assert!(!summary.is_empty());
        let total: usize = summary.iter().map(|s| s.count).sum();
        // 400 bars per symbol, the last 5 have no 5-bar return
        assert_eq!(total, 2 * (400 - 5));
    }

    #[test]
    fn results_are_sorted_and_limited() {
        let config = RunConfig {
            symbol_limit: 2,
            workers: 2,
            ..RunConfig::default()
        };
        let out = run_parallel(&source(&["ZZZ", "AAA", "MMM"]), &config).unwrap();
        let symbols: Vec<_> = out.results.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["AAA", "MMM"]);
    }

    #[test]
    fn unknown_symbol_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("symbol=BAD")).unwrap();
        std::fs::write(
            dir.path().join("symbol=BAD").join("bars.csv"),
            "date,open,close\n2024-01-02,1,2\n",
        )
        .unwrap();
        let src = crate::data_loader::PartitionedDirectory::csv(dir.path(), 0);
        let out = run_serial(&src, &RunConfig::default()).unwrap();
        assert!(out.results.is_empty());
        assert_eq!(out.skipped.len(), 1);
        assert!(out.skipped[0].reason.contains("missing required columns"));
    }

    #[test]
    fn invalid_config_fails_before_work() {
        let config = RunConfig {
            workers: 0,
            ..RunConfig::default()
        };
        assert!(matches!(
            run_parallel(&source(&["SPY"]), &config),
            Err(RunError::Config(_))
        ));
    }
}
