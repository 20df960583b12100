//! Mutable detector state, owned by exactly one `IncrementalDetector`.

use chrono::NaiveDate;

use super::reentry::Reentry;
use super::regime::RegimeMachine;
use crate::config::DetectorConfig;
use crate::domain::{EventLabel, Regime};
use crate::stats::{RollingStats, WindowStats};

/// Per-event bookkeeping: when it fired, whether it is locked, and its deadline.
///
/// Once `locked` is set the tracker is frozen. `deadline` is written once, on
/// the bar the prerequisite event fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventTracker {
    pub emitted: Option<usize>,
    pub locked: bool,
    pub deadline: Option<usize>,
}

impl EventTracker {
    /// Not yet fired and not locked.
    pub fn is_open(&self) -> bool {
        self.emitted.is_none() && !self.locked
    }

    pub fn within_deadline(&self, index: usize) -> bool {
        self.deadline.map_or(true, |d| index <= d)
    }

    /// Lock the tracker if its deadline passed without a firing.
    ///
    /// Returns true only on the bar the lock is first applied.
    pub(crate) fn expire(&mut self, index: usize) -> bool {
        match self.deadline {
            Some(d) if !self.locked && self.emitted.is_none() && index > d => {
                self.locked = true;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn set_deadline(&mut self, deadline: usize) {
        if self.locked {
            return;
        }
        debug_assert!(self.deadline.is_none(), "deadline assigned twice");
        self.deadline.get_or_insert(deadline);
    }
}

/// Index of the most recent firing for each label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastEvents([Option<usize>; 8]);

impl LastEvents {
    pub fn get(&self, label: EventLabel) -> Option<usize> {
        self.0[label.index()]
    }

    pub(crate) fn record(&mut self, label: EventLabel, index: usize) {
        self.0[label.index()] = Some(index);
    }

    /// True if `label` fired no more than `window` bars before `index`.
    pub fn within(&self, label: EventLabel, index: usize, window: usize) -> bool {
        self.get(label)
            .is_some_and(|at| index.saturating_sub(at) <= window)
    }
}

#[derive(Debug, Clone)]
pub struct DetectorState {
    pub(crate) index: Option<usize>,
    pub(crate) last_date: Option<NaiveDate>,

    pub(crate) tr_window: RollingStats,
    pub(crate) vol_window: RollingStats,
    pub(crate) close_window: RollingStats,
    pub(crate) tr_stats: WindowStats,
    pub(crate) vol_stats: WindowStats,

    pub(crate) sma: Option<f64>,
    pub(crate) prev_sma: Option<f64>,
    pub(crate) sma_slope: Option<f64>,
    pub(crate) prev_close: Option<f64>,

    pub(crate) trackers: [EventTracker; 8],
    pub(crate) support: Option<f64>,
    pub(crate) resistance: Option<f64>,
    pub(crate) low_since_sc: Option<f64>,
    pub(crate) high_since_bc: Option<f64>,
    pub(crate) spring_reentry: Reentry,
    pub(crate) ut_reentry: Reentry,

    pub(crate) last_events: LastEvents,
    pub(crate) regime: RegimeMachine,
}

impl DetectorState {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            index: None,
            last_date: None,
            tr_window: RollingStats::new(config.range_lookback),
            vol_window: RollingStats::new(config.vol_lookback),
            close_window: RollingStats::new(config.lookback_trend),
            tr_stats: WindowStats::UNDEFINED,
            vol_stats: WindowStats::UNDEFINED,
            sma: None,
            prev_sma: None,
            sma_slope: None,
            prev_close: None,
            trackers: [EventTracker::default(); 8],
            support: None,
            resistance: None,
            low_since_sc: None,
            high_since_bc: None,
            spring_reentry: Reentry::Idle,
            ut_reentry: Reentry::Idle,
            last_events: LastEvents::default(),
            regime: RegimeMachine::new(config.min_bars_in_range),
        }
    }

    pub fn tracker(&self, label: EventLabel) -> &EventTracker {
        &self.trackers[label.index()]
    }

    pub(crate) fn tracker_mut(&mut self, label: EventLabel) -> &mut EventTracker {
        &mut self.trackers[label.index()]
    }

    pub fn is_locked(&self, label: EventLabel) -> bool {
        self.tracker(label).locked
    }

    /// Index of the last processed bar.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.last_date
    }

    pub fn tr_mean(&self) -> Option<f64> {
        self.tr_stats.mean
    }

    pub fn tr_variance(&self) -> Option<f64> {
        self.tr_stats.variance()
    }

    pub fn vol_mean(&self) -> Option<f64> {
        self.vol_stats.mean
    }

    pub fn vol_variance(&self) -> Option<f64> {
        self.vol_stats.variance()
    }

    pub fn sma(&self) -> Option<f64> {
        self.sma
    }

    pub fn sma_slope(&self) -> Option<f64> {
        self.sma_slope
    }

    pub fn prev_close(&self) -> Option<f64> {
        self.prev_close
    }

    pub fn support(&self) -> Option<f64> {
        self.support
    }

    pub fn resistance(&self) -> Option<f64> {
        self.resistance
    }

    pub fn spring_reentry(&self) -> &Reentry {
        &self.spring_reentry
    }

    pub fn ut_reentry(&self) -> &Reentry {
        &self.ut_reentry
    }

    pub fn last_events(&self) -> &LastEvents {
        &self.last_events
    }

    pub fn regime(&self) -> Regime {
        self.regime.current()
    }

    pub fn regime_bars_held(&self) -> usize {
        self.regime.held()
    }

    /// Push one bar's true range / volume / close into the rolling windows.
    pub(crate) fn update_windows(&mut self, true_range: f64, volume: f64, close: f64) {
        self.tr_stats = self.tr_window.push(true_range);
        self.vol_stats = self.vol_window.push(volume);

        let close_stats = self.close_window.push(close);
        match close_stats.mean {
            Some(sma) => {
                self.sma_slope = self.prev_sma.map(|prev| sma - prev);
                self.sma = Some(sma);
                self.prev_sma = Some(sma);
            }
            None => {
                self.sma = None;
                self.sma_slope = None;
            }
        }
    }

    /// Extend the running low since SC / high since BC while their reaction is pending.
    pub(crate) fn track_extremes(&mut self, low: f64, high: f64) {
        if self.tracker(EventLabel::Sc).emitted.is_some()
            && self.tracker(EventLabel::Ar).emitted.is_none()
        {
            self.low_since_sc = Some(self.low_since_sc.map_or(low, |l| l.min(low)));
        }
        if self.tracker(EventLabel::Bc).emitted.is_some()
            && self.tracker(EventLabel::ArTop).emitted.is_none()
        {
            self.high_since_bc = Some(self.high_since_bc.map_or(high, |h| h.max(high)));
        }
    }

    /// Lock every deadline-bearing tracker whose window has closed.
    pub(crate) fn expire_deadlines(&mut self, index: usize) {
        const DEADLINED: [EventLabel; 6] = [
            EventLabel::Ar,
            EventLabel::ArTop,
            EventLabel::Spring,
            EventLabel::Ut,
            EventLabel::Sos,
            EventLabel::Sow,
        ];
        for label in DEADLINED {
            if self.tracker_mut(label).expire(index) {
                log::debug!("{label} deadline passed at bar {index}; locked");
                match label {
                    EventLabel::Spring => self.spring_reentry.clear(),
                    EventLabel::Ut => self.ut_reentry.clear(),
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_expires_once_after_deadline() {
        let mut t = EventTracker {
            deadline: Some(5),
            ..EventTracker::default()
        };
        assert!(!t.expire(5));
        assert!(t.expire(6));
        assert!(!t.expire(7));
        assert!(t.locked);
        assert!(!t.is_open());
    }

    #[test]
    fn emitted_tracker_never_expires() {
        let mut t = EventTracker {
            emitted: Some(3),
            deadline: Some(4),
            ..EventTracker::default()
        };
        assert!(!t.expire(10));
        assert!(!t.locked);
    }

    #[test]
    fn tracker_without_deadline_is_always_within() {
        let t = EventTracker::default();
        assert!(t.within_deadline(usize::MAX));
        assert!(t.is_open());
    }

    #[test]
    fn last_events_window() {
        let mut last = LastEvents::default();
        assert!(!last.within(EventLabel::Sc, 10, 60));
        last.record(EventLabel::Sc, 10);
        assert!(last.within(EventLabel::Sc, 70, 60));
        assert!(!last.within(EventLabel::Sc, 71, 60));
    }

    #[test]
    fn sma_slope_needs_two_full_windows() {
        let config = DetectorConfig {
            lookback_trend: 2,
            ..DetectorConfig::default()
        };
        let mut state = DetectorState::new(&config);
        state.update_windows(1.0, 1.0, 10.0);
        assert!(state.sma().is_none());
        state.update_windows(1.0, 1.0, 12.0);
        assert_eq!(state.sma(), Some(11.0));
        assert!(state.sma_slope().is_none());
        state.update_windows(1.0, 1.0, 8.0);
        assert_eq!(state.sma(), Some(10.0));
        assert_eq!(state.sma_slope(), Some(-1.0));
    }
}
