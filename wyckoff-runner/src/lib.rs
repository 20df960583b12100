//! Wyckoff Runner: multi-symbol orchestration on top of `wyckoff-core`.
//!
//! This crate provides:
//! - Partitioned Parquet or CSV loading (`symbol=<SYM>/*`) and a synthetic source
//! - Serial and rayon-parallel runs with one detector per symbol
//! - Serial/parallel equivalence validation with BLAKE3 digests
//! - Forward returns and per-event summary statistics
//! - Regime transition, event sequence and prior-regime labels
//! - Per-regime forward statistics against a baseline regime
//! - CSV tables and a JSON manifest per run

pub mod config;
pub mod data_loader;
pub mod export;
pub mod forward;
pub mod labels;
pub mod regime_eval;
pub mod runner;
pub mod synthetic;
pub mod validate;

pub use config::{ConfigError, RunConfig, RunId, SUMMARY_WINDOW};
pub use data_loader::{BarSource, DataFormat, LoadError, PartitionedDirectory, SyntheticSource};
pub use export::{save_outputs, Manifest};
pub use forward::{add_forward_returns, summarize, ForwardRow, SummaryRow};
pub use labels::{
    attach_prior_regime, label_event_sequences, label_regime_transitions, EventContext,
    RegimeTransition, SequenceEvent, SequenceId,
};
pub use regime_eval::{
    add_forward_returns_daily, pairwise_vs_baseline, summarize_regimes, BaselineDelta,
    DailyForward, RegimeSummaryRow,
};
pub use runner::{
    process_symbol, run_parallel, run_serial, RunError, RunOutput, Skipped, SymbolResult,
};
pub use validate::{check_equivalence, EquivalenceReport, ValidationError};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn run_config_is_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
    }

    #[test]
    fn sources_are_send_sync() {
        assert_send::<PartitionedDirectory>();
        assert_sync::<PartitionedDirectory>();
        assert_send::<SyntheticSource>();
        assert_sync::<SyntheticSource>();
    }

    #[test]
    fn symbol_result_is_send_sync() {
        assert_send::<SymbolResult>();
        assert_sync::<SymbolResult>();
    }

    #[test]
    fn run_output_is_send_sync() {
        assert_send::<RunOutput>();
        assert_sync::<RunOutput>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<RunError>();
        assert_sync::<RunError>();
        assert_send::<LoadError>();
        assert_sync::<LoadError>();
    }
}
