//! Fixed-capacity rolling window with population mean / standard deviation.
//!
//! Storage is a ring buffer allocated once at construction. Statistics are
//! recomputed over the whole window on every push, so the result for a given
//! window content is independent of the path that produced it.

/// Mean and standard deviation of a full window.
///
/// Both are `None` until the window has filled. `std` is also `None` when it
/// is exactly zero or not finite, which makes any z-score undefined.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowStats {
    pub mean: Option<f64>,
    pub std: Option<f64>,
}

impl WindowStats {
    pub const UNDEFINED: WindowStats = WindowStats {
        mean: None,
        std: None,
    };

    pub fn variance(&self) -> Option<f64> {
        self.std.map(|s| s * s)
    }
}

#[derive(Debug, Clone)]
pub struct RollingStats {
    buf: Vec<f64>,
    capacity: usize,
    head: usize,
    len: usize,
    last: WindowStats,
}

impl RollingStats {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "rolling window capacity must be >= 1");
        Self {
            buf: vec![0.0; capacity],
            capacity,
            head: 0,
            len: 0,
            last: WindowStats::UNDEFINED,
        }
    }

    /// Append a value, evicting the oldest once full, and return the window stats.
    pub fn push(&mut self, value: f64) -> WindowStats {
        self.buf[self.head] = value;
        self.head = (self.head + 1) % self.capacity;
        if self.len < self.capacity {
            self.len += 1;
        }
        self.last = self.compute();
        self.last
    }

    fn compute(&self) -> WindowStats {
        if !self.is_full() {
            return WindowStats::UNDEFINED;
        }
        let n = self.capacity as f64;
        let mean = self.buf.iter().sum::<f64>() / n;
        let var = self.buf.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = var.sqrt();
        WindowStats {
            mean: Some(mean),
            std: (std != 0.0 && std.is_finite()).then_some(std),
        }
    }

    /// Stats from the most recent push.
    pub fn last(&self) -> WindowStats {
        self.last
    }

    /// Window contents from oldest to newest.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        let start = if self.is_full() { self.head } else { 0 };
        (0..self.len).map(move |i| self.buf[(start + i) % self.capacity])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn undefined_until_full() {
        let mut rs = RollingStats::new(3);
        assert_eq!(rs.push(1.0), WindowStats::UNDEFINED);
        assert_eq!(rs.push(2.0), WindowStats::UNDEFINED);
        let stats = rs.push(3.0);
        assert_approx(stats.mean.unwrap(), 2.0, DEFAULT_EPSILON);
        // population std of [1,2,3] = sqrt(2/3)
        assert_approx(stats.std.unwrap(), (2.0_f64 / 3.0).sqrt(), DEFAULT_EPSILON);
    }

    #[test]
    fn evicts_oldest() {
        let mut rs = RollingStats::new(3);
        for v in [1.0, 2.0, 3.0, 10.0] {
            rs.push(v);
        }
        let window: Vec<f64> = rs.values().collect();
        assert_eq!(window, vec![2.0, 3.0, 10.0]);
        assert_approx(rs.last().mean.unwrap(), 5.0, DEFAULT_EPSILON);
        assert_eq!(rs.len(), 3);
    }

    #[test]
    fn zero_variance_has_mean_but_no_std() {
        let mut rs = RollingStats::new(4);
        let mut stats = WindowStats::UNDEFINED;
        for _ in 0..4 {
            stats = rs.push(7.0);
        }
        assert_eq!(stats.mean, Some(7.0));
        assert!(stats.std.is_none());
        assert!(stats.variance().is_none());
    }

    #[test]
    fn nan_in_window_leaves_std_undefined() {
        let mut rs = RollingStats::new(2);
        rs.push(1.0);
        let stats = rs.push(f64::NAN);
        assert!(stats.std.is_none());
        let stats = rs.push(3.0);
        assert!(stats.std.is_none());
        let stats = rs.push(5.0);
        assert_approx(stats.std.unwrap(), 1.0, DEFAULT_EPSILON);
    }

    #[test]
    fn capacity_one_never_has_std() {
        let mut rs = RollingStats::new(1);
        let stats = rs.push(4.0);
        assert_eq!(stats.mean, Some(4.0));
        assert!(stats.std.is_none());
    }

    #[test]
    fn values_before_full_are_in_arrival_order() {
        let mut rs = RollingStats::new(5);
        rs.push(1.0);
        rs.push(2.0);
        assert_eq!(rs.values().collect::<Vec<_>>(), vec![1.0, 2.0]);
        assert!(!rs.is_full());
        assert!(!rs.is_empty());
    }
}
