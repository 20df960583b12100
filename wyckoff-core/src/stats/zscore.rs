//! Scaled z-score over a rolling window.

use super::rolling::WindowStats;

/// `(value - mean) / std * scale`, or `None` when the window is not full,
/// its variance is zero, or the raw z-score is NaN.
pub fn zscore(value: f64, stats: WindowStats, scale: f64) -> Option<f64> {
    let (mean, std) = (stats.mean?, stats.std?);
    let z = (value - mean) / std;
    if z.is_nan() {
        None
    } else {
        Some(z * scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{assert_approx, DEFAULT_EPSILON};

    fn stats(mean: f64, std: f64) -> WindowStats {
        WindowStats {
            mean: Some(mean),
            std: Some(std),
        }
    }

    #[test]
    fn basic_zscore() {
        assert_approx(zscore(14.0, stats(10.0, 2.0), 1.0).unwrap(), 2.0, DEFAULT_EPSILON);
        assert_approx(zscore(8.0, stats(10.0, 2.0), 1.0).unwrap(), -1.0, DEFAULT_EPSILON);
    }

    #[test]
    fn scale_multiplies_defined_result() {
        assert_approx(zscore(14.0, stats(10.0, 2.0), 1.5).unwrap(), 3.0, DEFAULT_EPSILON);
    }

    #[test]
    fn undefined_inputs_stay_undefined() {
        assert!(zscore(1.0, WindowStats::UNDEFINED, 1.0).is_none());
        let flat = WindowStats {
            mean: Some(3.0),
            std: None,
        };
        assert!(zscore(1.0, flat, 2.0).is_none());
        assert!(zscore(f64::NAN, stats(1.0, 1.0), 1.0).is_none());
    }
}
