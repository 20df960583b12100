//! Detector tunables.
//!
//! A `DetectorConfig` is fixed for the lifetime of a detector instance. Every
//! field has a default, so a TOML file only needs to name the values it
//! overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be >= 1")]
    ZeroWindow { field: &'static str },

    #[error("{field} must be finite, got {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("{field} must be > 0, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Tunables for the incremental detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    // Windowing
    pub lookback_trend: usize,
    pub vol_lookback: usize,
    pub range_lookback: usize,
    pub min_bars_in_range: usize,

    // Z-score thresholds, compared against scaled z-scores
    pub sc_tr_z: f64,
    pub sc_vol_z: f64,
    pub bc_tr_z: f64,
    pub bc_vol_z: f64,
    pub sow_tr_z: f64,
    pub sos_tr_z: f64,
    pub spring_vol_z: f64,

    // Global sensitivity multipliers
    pub range_z_scale: f64,
    pub volume_z_scale: f64,

    // Spring / upthrust geometry
    pub spring_break_pct: f64,
    pub spring_reentry_bars: usize,
    pub spring_close_pos: f64,
    pub ut_break_pct: f64,
    pub ut_reentry_bars: usize,
    pub ut_close_pos: f64,

    pub require_prior_trend_for_sc_bc: bool,
    pub min_phase_bars: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            lookback_trend: 20,
            vol_lookback: 40,
            range_lookback: 40,
            min_bars_in_range: 20,
            sc_tr_z: 2.0,
            sc_vol_z: 2.0,
            bc_tr_z: 2.0,
            bc_vol_z: 2.0,
            sow_tr_z: 1.5,
            sos_tr_z: 1.5,
            spring_vol_z: 0.8,
            range_z_scale: 1.0,
            volume_z_scale: 1.0,
            spring_break_pct: 0.01,
            spring_reentry_bars: 2,
            spring_close_pos: 0.6,
            ut_break_pct: 0.01,
            ut_reentry_bars: 2,
            ut_close_pos: 0.4,
            require_prior_trend_for_sc_bc: true,
            min_phase_bars: 2,
        }
    }
}

/// Multiplier applied to the largest lookback to get the Spring/UT/SOS/SOW window.
pub const LONG_WINDOW_FACTOR: usize = 25;

impl DetectorConfig {
    /// Check window sizes and numeric fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let windows = [
            ("lookback_trend", self.lookback_trend),
            ("vol_lookback", self.vol_lookback),
            ("range_lookback", self.range_lookback),
            ("min_bars_in_range", self.min_bars_in_range),
        ];
        for (field, value) in windows {
            if value == 0 {
                return Err(ConfigError::ZeroWindow { field });
            }
        }

        let floats = [
            ("sc_tr_z", self.sc_tr_z),
            ("sc_vol_z", self.sc_vol_z),
            ("bc_tr_z", self.bc_tr_z),
            ("bc_vol_z", self.bc_vol_z),
            ("sow_tr_z", self.sow_tr_z),
            ("sos_tr_z", self.sos_tr_z),
            ("spring_vol_z", self.spring_vol_z),
            ("range_z_scale", self.range_z_scale),
            ("volume_z_scale", self.volume_z_scale),
            ("spring_break_pct", self.spring_break_pct),
            ("spring_close_pos", self.spring_close_pos),
            ("ut_break_pct", self.ut_break_pct),
            ("ut_close_pos", self.ut_close_pos),
        ];
        for (field, value) in floats {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { field, value });
            }
        }

        for (field, value) in [
            ("range_z_scale", self.range_z_scale),
            ("volume_z_scale", self.volume_z_scale),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }

        Ok(())
    }

    /// Deadline span for Spring, Upthrust, SOS and SOW after an automatic rally/reaction.
    pub fn long_window(&self) -> usize {
        self.lookback_trend
            .max(self.range_lookback)
            .max(self.vol_lookback)
            * LONG_WINDOW_FACTOR
    }

    /// Parse and validate a config from TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file.
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

    /// Deterministic content hash of every tunable.
    ///
    /// Two configs with the same fingerprint produce identical output tables
    /// for identical input.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_surface() {
        let c = DetectorConfig::default();
        assert_eq!(
            (c.lookback_trend, c.vol_lookback, c.range_lookback, c.min_bars_in_range),
            (20, 40, 40, 20)
        );
        assert_eq!((c.sc_tr_z, c.sc_vol_z, c.bc_tr_z, c.bc_vol_z), (2.0, 2.0, 2.0, 2.0));
        assert_eq!((c.sow_tr_z, c.sos_tr_z, c.spring_vol_z), (1.5, 1.5, 0.8));
        assert_eq!((c.range_z_scale, c.volume_z_scale), (1.0, 1.0));
        assert_eq!(
            (c.spring_break_pct, c.spring_reentry_bars, c.spring_close_pos),
            (0.01, 2, 0.6)
        );
        assert_eq!((c.ut_break_pct, c.ut_reentry_bars, c.ut_close_pos), (0.01, 2, 0.4));
        assert!(c.require_prior_trend_for_sc_bc);
        assert_eq!(c.min_phase_bars, 2);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn long_window_uses_largest_lookback() {
        let c = DetectorConfig::default();
        assert_eq!(c.long_window(), 1000);

        let c = DetectorConfig {
            lookback_trend: 60,
            ..DetectorConfig::default()
        };
        assert_eq!(c.long_window(), 1500);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = DetectorConfig::from_toml("min_bars_in_range = 10\nsc_vol_z = 2.5\n").unwrap();
        assert_eq!(c.min_bars_in_range, 10);
        assert_eq!(c.sc_vol_z, 2.5);
        assert_eq!(c.vol_lookback, 40);
    }

    #[test]
    fn toml_roundtrip() {
        let c = DetectorConfig {
            require_prior_trend_for_sc_bc: false,
            ..DetectorConfig::default()
        };
        let text = c.to_toml().unwrap();
        assert_eq!(DetectorConfig::from_toml(&text).unwrap(), c);
    }

    #[test]
    fn zero_window_rejected() {
        let c = DetectorConfig {
            range_lookback: 0,
            ..DetectorConfig::default()
        };
        assert!(matches!(
            c.validate(),
            Err(ConfigError::ZeroWindow { field: "range_lookback" })
        ));
    }

    #[test]
    fn non_finite_threshold_rejected() {
        let c = DetectorConfig {
            sos_tr_z: f64::NAN,
            ..DetectorConfig::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::NonFinite { field: "sos_tr_z", .. })));
    }

    #[test]
    fn fingerprint_is_deterministic_and_sensitive() {
        let a = DetectorConfig::default();
        assert_eq!(a.fingerprint(), DetectorConfig::default().fingerprint());
        let b = DetectorConfig {
            spring_reentry_bars: 3,
            ..DetectorConfig::default()
        };
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
