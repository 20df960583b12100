//! CSV and JSON artifacts for a finished run.
//!
//! One directory per run id, holding:
//! - `events.csv`, `regimes.csv`, `daily_regimes.csv`
//! - `forward_returns.csv` and `summary.csv`
//! - `regime_transitions.csv`, `event_sequences.csv`, `event_context.csv`
//! - `daily_forward_returns.csv`, `regime_summary.csv`, `regime_vs_baseline.csv`
//! - `manifest.json` describing the run
//!
//! Undefined numbers are written as empty cells. The manifest carries no
//! wall-clock timestamp, so re-running the same config over the same data
//! rewrites identical bytes.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::forward::{summarize, SummaryRow};
use crate::regime_eval::{pairwise_vs_baseline, BaselineDelta, RegimeSummaryRow};
use crate::runner::{RunOutput, Skipped, SCHEMA_VERSION};
use crate::validate::{event_digest, score_text};

fn opt(value: Option<f64>) -> String {
    value.map(|v| format!("{v}")).unwrap_or_default()
}

fn window_header(fixed: &[&str], windows: &[usize]) -> Vec<String> {
    let mut header: Vec<String> = fixed.iter().map(|s| s.to_string()).collect();
    header.extend(windows.iter().map(|w| format!("fwd_{w}")));
    header
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── CSV tables ─────────────────────────────────────────────────────

/// Columns: symbol, date, event, score
pub fn events_csv(output: &RunOutput) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["symbol", "date", "event", "score"])?;
    for r in &output.results {
        for e in &r.events {
            wtr.write_record([
                r.symbol.as_str(),
                &e.date.to_string(),
                e.label.as_str(),
                &score_text(e.score),
            ])?;
        }
    }
    finish(wtr)
}

/// Regime after every bar, from the incremental machine.
pub fn regimes_csv(output: &RunOutput) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["symbol", "date", "regime"])?;
    for r in &output.results {
        for b in &r.regimes {
            wtr.write_record([r.symbol.as_str(), &b.date.to_string(), b.regime.as_str()])?;
        }
    }
    finish(wtr)
}

pub fn daily_regimes_csv(output: &RunOutput) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["symbol", "date", "regime"])?;
    for r in &output.results {
        for d in &r.daily {
            wtr.write_record([r.symbol.as_str(), &d.date.to_string(), d.regime.as_str()])?;
        }
    }
    finish(wtr)
}

/// Columns: symbol, date, event, score, then one `fwd_<w>` per window.
pub fn forward_returns_csv(output: &RunOutput, windows: &[usize]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(window_header(&["symbol", "date", "event", "score"], windows))?;

    for row in output.forward_rows() {
        let mut record = vec![
            row.symbol.clone(),
            row.event.date.to_string(),
            row.event.label.as_str().to_string(),
            score_text(row.event.score),
        ];
        record.extend(windows.iter().map(|&w| opt(row.get(w))));
        wtr.write_record(&record)?;
    }
    finish(wtr)
}

pub fn summary_csv(summary: &[SummaryRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "event",
        "density",
        "median_fwd_20",
        "win_rate_20",
        "p5_fwd_20",
        "stability_delta",
        "event_count",
    ])?;
    for s in summary {
        wtr.write_record([
            s.event.as_str(),
            &opt(s.density),
            &opt(s.median_fwd_20),
            &opt(s.win_rate_20),
            &opt(s.p5_fwd_20),
            &opt(s.stability_delta),
            &s.event_count.to_string(),
        ])?;
    }
    finish(wtr)
}

// ─── Label tables ───────────────────────────────────────────────────

pub fn regime_transitions_csv(output: &RunOutput) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["symbol", "date", "transition", "prior_regime", "new_regime"])?;
    for r in &output.results {
        for t in &r.transitions {
            wtr.write_record([
                r.symbol.as_str(),
                &t.date.to_string(),
                &t.label(),
                t.from.as_str(),
                t.to.as_str(),
            ])?;
        }
    }
    finish(wtr)
}

pub fn event_sequences_csv(output: &RunOutput) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["symbol", "date", "sequence_id"])?;
    for r in &output.results {
        for seq in &r.sequences {
            wtr.write_record([r.symbol.as_str(), &seq.date.to_string(), seq.sequence.as_str()])?;
        }
    }
    finish(wtr)
}

/// Columns: symbol, date, event, prior_regime (empty when unknown).
pub fn event_context_csv(output: &RunOutput) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["symbol", "date", "event", "prior_regime"])?;
    for r in &output.results {
        for c in &r.event_context {
            wtr.write_record([
                r.symbol.as_str(),
                &c.date.to_string(),
                c.label.as_str(),
                c.prior_regime.map_or("", |p| p.as_str()),
            ])?;
        }
    }
    finish(wtr)
}

// ─── Regime forward statistics ──────────────────────────────────────

pub fn daily_forward_returns_csv(output: &RunOutput, windows: &[usize]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(window_header(&["symbol", "date"], windows))?;
    for r in &output.results {
        for f in &r.daily_forward {
            let mut record = vec![r.symbol.clone(), f.date.to_string()];
            record.extend(windows.iter().map(|&w| opt(f.get(w))));
            wtr.write_record(&record)?;
        }
    }
    finish(wtr)
}

pub fn regime_summary_csv(summary: &[RegimeSummaryRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["regime", "window", "count", "median", "win_rate", "p5"])?;
    for s in summary {
        wtr.write_record([
            s.regime.as_str(),
            &s.window.to_string(),
            &s.count.to_string(),
            &opt(s.median),
            &opt(s.win_rate),
            &opt(s.p5),
        ])?;
    }
    finish(wtr)
}

pub fn regime_vs_baseline_csv(deltas: &[BaselineDelta]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "regime",
        "window",
        "baseline_regime",
        "median_delta",
        "win_rate_delta",
        "p5_delta",
    ])?;
    for d in deltas {
        wtr.write_record([
            d.regime.as_str(),
            &d.window.to_string(),
            d.baseline_regime.as_str(),
            &opt(d.median_delta),
            &opt(d.win_rate_delta),
            &opt(d.p5_delta),
        ])?;
    }
    finish(wtr)
}

// ─── Manifest ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub run_id: String,
    pub detector_fingerprint: String,
    pub symbols: usize,
    pub skipped: Vec<Skipped>,
    pub bars: usize,
    pub events: usize,
    pub coverage_years: f64,
    pub event_digest: String,
    pub forward_windows: Vec<usize>,
}

impl Manifest {
    pub fn new(output: &RunOutput, config: &RunConfig) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            run_id: config.run_id(),
            detector_fingerprint: config.detector.fingerprint(),
            symbols: output.results.len(),
            skipped: output.skipped.clone(),
            bars: output.bar_count(),
            events: output.event_count(),
            coverage_years: output.coverage_years(),
            event_digest: event_digest(output),
            forward_windows: config.windows(),
        }
    }
}

/// Load a manifest, rejecting unknown schema versions.
pub fn load_manifest(dir: &Path) -> Result<Manifest> {
    let path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let manifest: Manifest =
        serde_json::from_str(&json).context("failed to deserialize manifest")?;
    if manifest.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            manifest.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(manifest)
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write every table plus `manifest.json` under `output_dir/<run_id>/`.
///
/// Returns the run directory.
pub fn save_outputs(output: &RunOutput, config: &RunConfig, output_dir: &Path) -> Result<PathBuf> {
    let run_dir = output_dir.join(config.run_id());
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create output dir: {}", run_dir.display()))?;

    let windows = config.windows();
    let summary = summarize(
        &output.forward_rows().cloned().collect::<Vec<_>>(),
        output.coverage_years(),
    );
    let regime_summary = output.regime_summary(&windows);
    let deltas = pairwise_vs_baseline(&regime_summary, config.baseline_regime);

    let files = [
        ("events.csv", events_csv(output)?),
        ("regimes.csv", regimes_csv(output)?),
        ("daily_regimes.csv", daily_regimes_csv(output)?),
        ("forward_returns.csv", forward_returns_csv(output, &windows)?),
        ("summary.csv", summary_csv(&summary)?),
        ("regime_transitions.csv", regime_transitions_csv(output)?),
        ("event_sequences.csv", event_sequences_csv(output)?),
        ("event_context.csv", event_context_csv(output)?),
        ("daily_forward_returns.csv", daily_forward_returns_csv(output, &windows)?),
        ("regime_summary.csv", regime_summary_csv(&regime_summary)?),
        ("regime_vs_baseline.csv", regime_vs_baseline_csv(&deltas)?),
    ];
    for (name, body) in &files {
        let path = run_dir.join(name);
        std::fs::write(&path, body)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    let manifest = serde_json::to_string_pretty(&Manifest::new(output, config))
        .context("failed to serialize manifest")?;
    std::fs::write(run_dir.join("manifest.json"), manifest)
        .context("failed to write manifest.json")?;

    log::info!("wrote {} tables to {}", files.len(), run_dir.display());
    Ok(run_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::ForwardRow;
    use crate::labels::{EventContext, RegimeTransition, SequenceEvent, SequenceId};
    use crate::regime_eval::DailyForward;
    use crate::runner::SymbolResult;
    use chrono::NaiveDate;
    use wyckoff_core::classify::DailyRegime;
    use wyckoff_core::detector::BarRegime;
    use wyckoff_core::domain::{Event, EventLabel, Regime};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn sample() -> RunOutput {
        let sc = Event {
            index: 0,
            date: d(4),
            label: EventLabel::Sc,
            score: 2.5,
        };
        let ut = Event {
            index: 1,
            date: d(5),
            label: EventLabel::Ut,
            score: f64::NAN,
        };
        RunOutput {
            results: vec![SymbolResult {
                symbol: "SPY".into(),
                bar_count: 2,
                coverage_years: 1.0,
                dataset_hash: String::new(),
                events: vec![sc.clone(), ut],
                regimes: vec![
                    BarRegime {
                        date: d(4),
                        regime: Regime::Accumulation,
                    },
                    BarRegime {
                        date: d(5),
                        regime: Regime::Accumulation,
                    },
                ],
                daily: vec![DailyRegime {
                    date: d(4),
                    regime: Regime::Accumulation,
                }],
                phases: vec![],
                forward: vec![ForwardRow {
                    symbol: "SPY".into(),
                    event: sc.clone(),
                    returns: vec![(5, Some(0.5)), (20, None)],
                }],
                daily_forward: vec![
                    DailyForward {
                        date: d(4),
                        returns: vec![(5, Some(0.25)), (20, None)],
                    },
                    DailyForward {
                        date: d(5),
                        returns: vec![(5, None), (20, None)],
                    },
                ],
                transitions: vec![RegimeTransition {
                    date: d(5),
                    from: Regime::Markdown,
                    to: Regime::Accumulation,
                }],
                sequences: vec![SequenceEvent {
                    date: d(5),
                    sequence: SequenceId::Recovery,
                }],
                event_context: vec![
                    EventContext {
                        date: sc.date,
                        label: sc.label,
                        prior_regime: None,
                    },
                    EventContext {
                        date: d(5),
                        label: EventLabel::Ut,
                        prior_regime: Some(Regime::Accumulation),
                    },
                ],
            }],
            skipped: vec![],
        }
    }

    #[test]
    fn events_csv_writes_nan_as_empty() {
        let csv = events_csv(&sample()).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[0], "symbol,date,event,score");
        assert_eq!(lines[1], "SPY,2024-03-04,SC,2.5");
        assert_eq!(lines[2], "SPY,2024-03-05,UT,");
    }

    #[test]
    fn regime_tables_use_upper_case_names() {
        let csv = regimes_csv(&sample()).unwrap();
        assert!(csv.contains("SPY,2024-03-05,ACCUMULATION"));
        let daily = daily_regimes_csv(&sample()).unwrap();
        assert_eq!(daily.lines().count(), 2);
    }

    #[test]
    fn forward_returns_have_one_column_per_window() {
        let csv = forward_returns_csv(&sample(), &[5, 20]).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[0], "symbol,date,event,score,fwd_5,fwd_20");
        assert_eq!(lines[1], "SPY,2024-03-04,SC,2.5,0.5,");
    }

    #[test]
    fn label_tables_name_regimes_and_sequences() {
        let out = sample();
        let transitions = regime_transitions_csv(&out).unwrap();
        assert_eq!(
            transitions.lines().nth(1),
            Some("SPY,2024-03-05,MARKDOWN->ACCUMULATION,MARKDOWN,ACCUMULATION")
        );
        let sequences = event_sequences_csv(&out).unwrap();
        assert_eq!(sequences.lines().nth(1), Some("SPY,2024-03-05,SEQ_RECOVERY"));
        let context = event_context_csv(&out).unwrap();
        let lines: Vec<_> = context.lines().collect();
        assert_eq!(lines[0], "symbol,date,event,prior_regime");
        assert_eq!(lines[1], "SPY,2024-03-04,SC,");
        assert_eq!(lines[2], "SPY,2024-03-05,UT,ACCUMULATION");
    }

    #[test]
    fn regime_statistics_tables() {
        let out = sample();
        let daily = daily_forward_returns_csv(&out, &[5, 20]).unwrap();
        let lines: Vec<_> = daily.lines().collect();
        assert_eq!(lines[0], "symbol,date,fwd_5,fwd_20");
        assert_eq!(lines[1], "SPY,2024-03-04,0.25,");

        let summary = out.regime_summary(&[5]);
        let table = regime_summary_csv(&summary).unwrap();
        assert_eq!(table.lines().nth(1), Some("ACCUMULATION,5,1,0.25,1,0.25"));

        let deltas = pairwise_vs_baseline(&summary, Regime::Unknown);
        let table = regime_vs_baseline_csv(&deltas).unwrap();
        assert_eq!(table.lines().nth(1), Some("ACCUMULATION,5,UNKNOWN,,,"));
    }

    #[test]
    fn save_and_load_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig::default();
        let run_dir = save_outputs(&sample(), &config, dir.path()).unwrap();
        for name in [
            "events.csv",
            "regimes.csv",
            "daily_regimes.csv",
            "forward_returns.csv",
            "summary.csv",
            "regime_transitions.csv",
            "event_sequences.csv",
            "event_context.csv",
            "daily_forward_returns.csv",
            "regime_summary.csv",
            "regime_vs_baseline.csv",
            "manifest.json",
        ] {
            assert!(run_dir.join(name).exists(), "{name} missing");
        }
        let manifest = load_manifest(&run_dir).unwrap();
        assert_eq!(manifest.schema_version, SCHEMA_VERSION);
        assert_eq!(manifest.run_id, config.run_id());
        assert_eq!(manifest.events, 2);
        assert_eq!(manifest.symbols, 1);
    }

    #[test]
    fn newer_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = Manifest::new(&sample(), &RunConfig::default());
        manifest.schema_version = SCHEMA_VERSION + 1;
        std::fs::write(
            dir.path().join("manifest.json"),
            serde_json::to_string(&manifest).unwrap(),
        )
        .unwrap();
        let err = load_manifest(dir.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported schema version"));
    }
}
