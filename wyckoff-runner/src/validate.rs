//! Serial/parallel equivalence check.
//!
//! Both outputs are reduced to canonical tables (events sorted by symbol,
//! date, label and score text; per-bar and daily regimes; forward rows;
//! transition, sequence and context labels) and compared row by row. The
//! report carries a BLAKE3 digest of each event table so two runs can also
//! be compared across machines.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wyckoff_core::domain::Event;

use crate::runner::{RunOutput, SymbolResult};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("symbol sets differ: serial {serial:?}, parallel {parallel:?}")]
    SymbolMismatch {
        serial: Vec<String>,
        parallel: Vec<String>,
    },

    #[error("{symbol}: event tables differ at row {row}")]
    EventMismatch { symbol: String, row: usize },

    #[error("{symbol}: per-bar regimes differ")]
    RegimeMismatch { symbol: String },

    #[error("{symbol}: forward-return rows differ")]
    ForwardMismatch { symbol: String },

    #[error("{symbol}: transition, sequence or context labels differ")]
    LabelMismatch { symbol: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceReport {
    pub symbols: usize,
    pub events: usize,
    pub serial_digest: String,
    pub parallel_digest: String,
}

/// Score as written to output tables: shortest round-trip decimal, empty for NaN.
pub fn score_text(score: f64) -> String {
    if score.is_nan() {
        String::new()
    } else {
        format!("{score}")
    }
}

/// One canonical event row: (date, label, score text).
type EventKey = (String, &'static str, String);

fn event_keys(events: &[Event]) -> Vec<EventKey> {
    let mut keys: Vec<EventKey> = events
        .iter()
        .map(|e| (e.date.to_string(), e.label.as_str(), score_text(e.score)))
        .collect();
    keys.sort();
    keys
}

/// BLAKE3 digest of the canonical event table of a run.
pub fn event_digest(output: &RunOutput) -> String {
    let mut hasher = blake3::Hasher::new();
    for result in &output.results {
        for (date, label, score) in event_keys(&result.events) {
            hasher.update(result.symbol.as_bytes());
            hasher.update(b",");
            hasher.update(date.as_bytes());
            hasher.update(b",");
            hasher.update(label.as_bytes());
            hasher.update(b",");
            hasher.update(score.as_bytes());
            hasher.update(b"\n");
        }
    }
    hasher.finalize().to_hex().to_string()
}

fn compare_symbol(a: &SymbolResult, b: &SymbolResult) -> Result<(), ValidationError> {
    let (ka, kb) = (event_keys(&a.events), event_keys(&b.events));
    if let Some(row) = (0..ka.len().max(kb.len())).find(|&i| ka.get(i) != kb.get(i)) {
        return Err(ValidationError::EventMismatch {
            symbol: a.symbol.clone(),
            row,
        });
    }
    if a.regimes != b.regimes || a.daily != b.daily {
        return Err(ValidationError::RegimeMismatch {
            symbol: a.symbol.clone(),
        });
    }
    let forward_key = |r: &SymbolResult| -> Vec<(String, &'static str, Vec<Option<u64>>)> {
        let mut rows: Vec<_> = r
            .forward
            .iter()
            .map(|f| {
                (
                    f.event.date.to_string(),
                    f.event.label.as_str(),
                    f.returns.iter().map(|(_, v)| v.map(f64::to_bits)).collect(),
                )
            })
            .collect();
        rows.sort();
        rows
    };
    if forward_key(a) != forward_key(b) || a.daily_forward != b.daily_forward {
        return Err(ValidationError::ForwardMismatch {
            symbol: a.symbol.clone(),
        });
    }
    if a.transitions != b.transitions
        || a.sequences != b.sequences
        || a.event_context != b.event_context
    {
        return Err(ValidationError::LabelMismatch {
            symbol: a.symbol.clone(),
        });
    }
    Ok(())
}

pub fn check_equivalence(
    serial: &RunOutput,
    parallel: &RunOutput,
) -> Result<EquivalenceReport, ValidationError> {
    let names = |o: &RunOutput| o.results.iter().map(|r| r.symbol.clone()).collect::<Vec<_>>();
    let (sn, pn) = (names(serial), names(parallel));
    if sn != pn {
        return Err(ValidationError::SymbolMismatch {
            serial: sn,
            parallel: pn,
        });
    }

    for (a, b) in serial.results.iter().zip(&parallel.results) {
        compare_symbol(a, b)?;
    }

    Ok(EquivalenceReport {
        symbols: sn.len(),
        events: serial.event_count(),
        serial_digest: event_digest(serial),
        parallel_digest: event_digest(parallel),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use wyckoff_core::domain::EventLabel;

    fn result(symbol: &str, events: Vec<Event>) -> SymbolResult {
        SymbolResult {
            symbol: symbol.into(),
            bar_count: 0,
            coverage_years: 0.0,
            dataset_hash: String::new(),
            events,
            regimes: vec![],
            daily: vec![],
            phases: vec![],
            forward: vec![],
            daily_forward: vec![],
            transitions: vec![],
            sequences: vec![],
            event_context: vec![],
        }
    }

    fn ev(day: u32, label: EventLabel, score: f64) -> Event {
        Event {
            index: day as usize,
            date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            label,
            score,
        }
    }

    fn output(results: Vec<SymbolResult>) -> RunOutput {
        RunOutput {
            results,
            skipped: vec![],
        }
    }

    #[test]
    fn event_order_does_not_matter() {
        let a = output(vec![result(
            "SPY",
            vec![ev(1, EventLabel::Sc, 2.5), ev(3, EventLabel::Ut, f64::NAN)],
        )]);
        let b = output(vec![result(
            "SPY",
            vec![ev(3, EventLabel::Ut, f64::NAN), ev(1, EventLabel::Sc, 2.5)],
        )]);
        let report = check_equivalence(&a, &b).unwrap();
        assert_eq!(report.symbols, 1);
        assert_eq!(report.events, 2);
        assert_eq!(report.serial_digest, report.parallel_digest);
    }

    #[test]
    fn differing_score_is_reported() {
        let a = output(vec![result("SPY", vec![ev(1, EventLabel::Sc, 2.5)])]);
        let b = output(vec![result("SPY", vec![ev(1, EventLabel::Sc, 2.6)])]);
        assert_eq!(
            check_equivalence(&a, &b).unwrap_err(),
            ValidationError::EventMismatch {
                symbol: "SPY".into(),
                row: 0
            }
        );
    }

    #[test]
    fn differing_symbols_are_reported() {
        let a = output(vec![result("SPY", vec![])]);
        let b = output(vec![result("QQQ", vec![])]);
        assert!(matches!(
            check_equivalence(&a, &b),
            Err(ValidationError::SymbolMismatch { .. })
        ));
    }

    #[test]
    fn differing_sequence_labels_are_reported() {
        use crate::labels::{SequenceEvent, SequenceId};

        let a = output(vec![result("SPY", vec![ev(1, EventLabel::Sc, 2.5)])]);
        let mut b = a.clone();
        b.results[0].sequences.push(SequenceEvent {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            sequence: SequenceId::Recovery,
        });
        assert_eq!(
            check_equivalence(&a, &b).unwrap_err(),
            ValidationError::LabelMismatch {
                symbol: "SPY".into()
            }
        );
    }

    #[test]
    fn score_text_formats() {
        assert_eq!(score_text(2.5), "2.5");
        assert_eq!(score_text(f64::NAN), "");
    }
}
