//! Serializable run configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wyckoff_core::config::{ConfigError as DetectorConfigError, DetectorConfig};
use wyckoff_core::domain::Regime;

use crate::data_loader::{DataFormat, PartitionedDirectory};
use crate::labels::{
    DEFAULT_PRIOR_REGIME_LOOKBACK, DEFAULT_SEQUENCE_MAX_GAP_DAYS,
    DEFAULT_TRANSITION_MIN_PRIOR_BARS,
};

/// Content hash identifying a run configuration.
pub type RunId = String;

/// Forward-return window the summary statistics are computed on.
pub const SUMMARY_WINDOW: usize = 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("detector config: {0}")]
    Detector(#[from] DetectorConfigError),

    #[error("{field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse run config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize run config TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Everything needed to reproduce a multi-symbol run.
///
/// Every field has a default, so a TOML file only names what it overrides.
/// Detector tunables live under a `[detector]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Root of the `symbol=<SYM>/` directories.
    pub data_dir: PathBuf,
    /// File format inside each partition.
    pub data_format: DataFormat,
    pub output_dir: PathBuf,
    /// Keep only the trailing window of this many days per symbol; 0 keeps all.
    pub lookback_days: u32,
    /// Worker threads for the parallel runner.
    pub workers: usize,
    pub forward_windows: Vec<usize>,
    /// Process only the first N symbols (sorted); 0 means no limit.
    pub symbol_limit: usize,
    /// Daily rows a regime must last before a change out of it is labelled.
    pub transition_min_prior_bars: usize,
    /// Longest span, in days from its first event, of a labelled event sequence.
    pub sequence_max_gap_days: i64,
    /// Daily rows back from an event at which its prior regime is read.
    pub prior_regime_lookback: usize,
    /// Regime the per-regime forward statistics are compared against.
    pub baseline_regime: Regime,
    pub detector: DetectorConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/ohlcv_parquet"),
            data_format: DataFormat::Parquet,
            output_dir: PathBuf::from("outputs"),
            lookback_days: 0,
            workers: 8,
            forward_windows: vec![5, 10, 20, 40],
            symbol_limit: 0,
            transition_min_prior_bars: DEFAULT_TRANSITION_MIN_PRIOR_BARS,
            sequence_max_gap_days: DEFAULT_SEQUENCE_MAX_GAP_DAYS,
            prior_regime_lookback: DEFAULT_PRIOR_REGIME_LOOKBACK,
            baseline_regime: Regime::Unknown,
            detector: DetectorConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detector.validate()?;
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "workers",
                reason: "must be >= 1".into(),
            });
        }
        if self.forward_windows.is_empty() {
            return Err(ConfigError::Invalid {
                field: "forward_windows",
                reason: "must name at least one window".into(),
            });
        }
        if self.forward_windows.contains(&0) {
            return Err(ConfigError::Invalid {
                field: "forward_windows",
                reason: "windows must be >= 1".into(),
            });
        }
        Ok(())
    }

    /// Forward windows sorted and deduplicated.
    pub fn windows(&self) -> Vec<usize> {
        let mut w = self.forward_windows.clone();
        w.sort_unstable();
        w.dedup();
        w
    }

    /// The partitioned directory this config points at.
    pub fn source(&self) -> PartitionedDirectory {
        PartitionedDirectory::new(&self.data_dir, self.data_format, self.lookback_days)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Deterministic hash of the settings that affect output tables.
    ///
    /// Paths and the worker count are excluded: moving the data or changing
    /// parallelism must not change the run identity.
    pub fn run_id(&self) -> RunId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.detector.fingerprint().as_bytes());
        hasher.update(&self.lookback_days.to_le_bytes());
        hasher.update(&(self.symbol_limit as u64).to_le_bytes());
        for w in self.windows() {
            hasher.update(&(w as u64).to_le_bytes());
        }
        hasher.update(&(self.transition_min_prior_bars as u64).to_le_bytes());
        hasher.update(&self.sequence_max_gap_days.to_le_bytes());
        hasher.update(&(self.prior_regime_lookback as u64).to_le_bytes());
        hasher.update(self.baseline_regime.as_str().as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}
