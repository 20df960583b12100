//! Wyckoff Core: streaming structural event detection and regime labeling.
//!
//! This crate contains:
//! - Domain types (bars, events, regimes)
//! - Rolling window statistics and scaled z-scores
//! - The incremental detector: per-event trackers with deadlines and locks,
//!   Spring/Upthrust reentry confirmation, and the guarded regime machine
//! - Daily regime classification and phase segments over a finished event table
//!
//! The core is synchronous and owns no global state. One detector instance
//! processes one symbol; parallelism lives in `wyckoff-runner`.

pub mod classify;
pub mod config;
pub mod detector;
pub mod domain;
pub mod stats;

pub use classify::{classify_daily, phase_segments, DailyRegime, PhaseSegment};
pub use config::{ConfigError, DetectorConfig};
pub use detector::{BarRegime, DetectionOutput, DetectorError, IncrementalDetector, Step};
pub use domain::{Bar, Event, EventLabel, RawBar, Regime};
