//! Incremental structural event detector.
//!
//! `IncrementalDetector::update` consumes one bar at a time, in date order,
//! and returns at most one event per bar together with the regime label
//! after that bar. All state is owned by the detector instance; two
//! detectors never share anything, so symbols can be processed in any order
//! or in parallel with identical results.
//!
//! Per bar:
//! 1. push true range, volume and close into the rolling windows;
//! 2. extend the running low since SC / high since BC;
//! 3. lock every event whose deadline has passed;
//! 4. run the candidate cascade (SC, BC, AR, AR_TOP, SPRING, UT, SOS, SOW)
//!    and apply the first firing;
//! 5. advance the regime hold counter and remember the close.

pub mod checks;
pub mod reentry;
pub mod regime;
pub mod state;

pub use checks::{BarContext, CheckResult, Delta, Firing, Side};
pub use reentry::{Reentry, ReentryCandidate};
pub use regime::{RegimeMachine, Rule, Transition};
pub use state::{DetectorState, EventTracker, LastEvents};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ConfigError, DetectorConfig};
use crate::domain::{Bar, Event, EventLabel, Regime};
use crate::stats::zscore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectorError {
    #[error("bar dated {date} arrived after {previous}; bars must be in date order")]
    OutOfOrder { previous: NaiveDate, date: NaiveDate },
}

/// Result of processing one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub event: Option<Event>,
    pub regime: Regime,
}

/// Regime label after one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarRegime {
    pub date: NaiveDate,
    pub regime: Regime,
}

/// Everything produced by a full pass over one symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionOutput {
    pub events: Vec<Event>,
    pub regimes: Vec<BarRegime>,
}

#[derive(Debug, Clone)]
pub struct IncrementalDetector {
    config: DetectorConfig,
    state: DetectorState,
}

impl IncrementalDetector {
    pub fn new(config: DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = DetectorState::new(&config);
        Ok(Self { config, state })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn state(&self) -> &DetectorState {
        &self.state
    }

    pub fn regime(&self) -> Regime {
        self.state.regime()
    }

    /// Number of bars processed so far.
    pub fn bars_seen(&self) -> usize {
        self.state.index.map_or(0, |i| i + 1)
    }

    /// Process one bar.
    ///
    /// Fails only when `bar` is dated before the previous bar; the state is
    /// left untouched in that case.
    pub fn update(&mut self, bar: &Bar) -> Result<Step, DetectorError> {
        if let Some(previous) = self.state.last_date {
            if bar.date < previous {
                return Err(DetectorError::OutOfOrder {
                    previous,
                    date: bar.date,
                });
            }
        }

        let index = self.state.index.map_or(0, |i| i + 1);
        let state = &mut self.state;
        state.index = Some(index);
        state.last_date = Some(bar.date);

        state.update_windows(bar.true_range, bar.volume, bar.close);
        let ctx = BarContext {
            index,
            bar,
            tr_z: zscore(bar.true_range, state.tr_stats, self.config.range_z_scale),
            vol_z: zscore(bar.volume, state.vol_stats, self.config.volume_z_scale),
        };

        state.track_extremes(bar.low, bar.high);
        state.expire_deadlines(index);

        let event = self.run_cascade(&ctx);

        self.state.regime.tick();
        self.state.prev_close = Some(bar.close);

        Ok(Step {
            event,
            regime: self.state.regime(),
        })
    }

    /// Process a whole series, collecting events and per-bar regimes.
    pub fn run<'a, I>(&mut self, bars: I) -> Result<DetectionOutput, DetectorError>
    where
        I: IntoIterator<Item = &'a Bar>,
    {
        let mut out = DetectionOutput::default();
        for bar in bars {
            let step = self.update(bar)?;
            out.events.extend(step.event);
            out.regimes.push(BarRegime {
                date: bar.date,
                regime: step.regime,
            });
        }
        Ok(out)
    }

    fn run_cascade(&mut self, ctx: &BarContext<'_>) -> Option<Event> {
        for (label, check) in checks::CASCADE {
            let result = check(ctx, &self.state, &self.config);
            if let Some(reentry) = result.reentry {
                match label {
                    EventLabel::Spring => self.state.spring_reentry = reentry,
                    EventLabel::Ut => self.state.ut_reentry = reentry,
                    _ => {}
                }
            }
            if let Some(firing) = result.firing {
                return Some(self.apply(ctx.index, firing));
            }
        }
        None
    }

    fn apply(&mut self, index: usize, firing: Firing) -> Event {
        let Firing { event, delta } = firing;
        let label = event.label;
        let state = &mut self.state;

        state.tracker_mut(label).emitted = Some(event.index);
        match delta {
            Delta::Climax {
                side,
                reaction_deadline,
                extreme,
            } => {
                state.tracker_mut(side.climax()).locked = true;
                state.tracker_mut(side.reaction()).set_deadline(reaction_deadline);
                match side {
                    Side::Selling => state.low_since_sc = Some(extreme),
                    Side::Buying => state.high_since_bc = Some(extreme),
                }
            }
            Delta::Reaction {
                side,
                level,
                follow_up_deadline,
            } => {
                match side {
                    Side::Selling => state.support = Some(level),
                    Side::Buying => state.resistance = Some(level),
                }
                for follow_up in side.follow_ups() {
                    state.tracker_mut(follow_up).set_deadline(follow_up_deadline);
                }
            }
            Delta::Mark => {}
        }

        state.last_events.record(label, event.index);
        let transition = state.regime.on_event(label, index, &state.last_events);
        match transition {
            Transition::Accepted { from, to } => {
                log::debug!("bar {index}: {label} moves regime {from} -> {to}");
            }
            Transition::NoProposal | Transition::SameState => {}
            rejected => log::debug!("bar {index}: {label} regime change rejected: {rejected:?}"),
        }
        log::debug!(
            "bar {index}: emit {label} dated {} score {:.4}",
            event.date,
            event.score
        );
        event
    }
}
