//! Candidate checks, one per event kind, in cascade priority order.
//!
//! Every check is a pure function of an immutable view of the bar, the
//! detector state and the config. It returns a `CheckResult`: an optional
//! replacement for a Spring/Upthrust reentry sub-machine and an optional
//! firing. The detector applies the first firing and evaluates nothing
//! further for that bar.

use chrono::NaiveDate;

use super::reentry::{Reentry, ReentryCandidate};
use super::state::DetectorState;
use crate::config::DetectorConfig;
use crate::domain::{Bar, Event, EventLabel};

/// Close-position floor for a selling climax bar.
pub const SC_CLOSE_POS: f64 = 0.5;
/// Close-position floor for a buying climax bar.
pub const BC_CLOSE_POS: f64 = 0.6;
/// True-range z-score an automatic rally/reaction must exceed.
pub const AR_TR_Z: f64 = 0.5;

/// Per-bar inputs shared by all checks.
#[derive(Debug, Clone, Copy)]
pub struct BarContext<'a> {
    pub index: usize,
    pub bar: &'a Bar,
    pub tr_z: Option<f64>,
    pub vol_z: Option<f64>,
}

impl BarContext<'_> {
    fn date(&self) -> NaiveDate {
        self.bar.date
    }
}

/// Which climax a range hangs off: a selling climax below, a buying climax above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Selling,
    Buying,
}

impl Side {
    pub fn climax(self) -> EventLabel {
        match self {
            Side::Selling => EventLabel::Sc,
            Side::Buying => EventLabel::Bc,
        }
    }

    pub fn reaction(self) -> EventLabel {
        match self {
            Side::Selling => EventLabel::Ar,
            Side::Buying => EventLabel::ArTop,
        }
    }

    /// Events whose window opens when the reaction fixes the range edge.
    pub fn follow_ups(self) -> [EventLabel; 2] {
        match self {
            Side::Selling => [EventLabel::Spring, EventLabel::Sow],
            Side::Buying => [EventLabel::Ut, EventLabel::Sos],
        }
    }
}

/// State change that accompanies an emitted event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Delta {
    /// SC/BC: lock the climax, open the reaction window, seed the running extreme.
    Climax {
        side: Side,
        reaction_deadline: usize,
        extreme: f64,
    },
    /// AR/AR_TOP: fix the support/resistance level and open the follow-up windows.
    Reaction {
        side: Side,
        level: f64,
        follow_up_deadline: usize,
    },
    /// SPRING/UT/SOS/SOW: nothing beyond marking the event emitted.
    Mark,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Firing {
    pub event: Event,
    pub delta: Delta,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CheckResult {
    pub reentry: Option<Reentry>,
    pub firing: Option<Firing>,
}

impl CheckResult {
    const NONE: CheckResult = CheckResult {
        reentry: None,
        firing: None,
    };

    fn fire(event: Event, delta: Delta) -> Self {
        Self {
            reentry: None,
            firing: Some(Firing { event, delta }),
        }
    }
}

pub type Check = fn(&BarContext<'_>, &DetectorState, &DetectorConfig) -> CheckResult;

/// The cascade, highest priority first.
pub const CASCADE: [(EventLabel, Check); 8] = [
    (EventLabel::Sc, check_sc),
    (EventLabel::Bc, check_bc),
    (EventLabel::Ar, check_ar),
    (EventLabel::ArTop, check_ar_top),
    (EventLabel::Spring, check_spring),
    (EventLabel::Ut, check_ut),
    (EventLabel::Sos, check_sos),
    (EventLabel::Sow, check_sow),
];

fn event(ctx: &BarContext<'_>, label: EventLabel, score: f64) -> Event {
    Event {
        index: ctx.index,
        date: ctx.date(),
        label,
        score,
    }
}

#[allow(clippy::too_many_arguments)]
fn climax(
    ctx: &BarContext<'_>,
    side: Side,
    tr_threshold: f64,
    vol_threshold: f64,
    close_pos_floor: f64,
    trend_ok: bool,
    extreme: f64,
    config: &DetectorConfig,
) -> CheckResult {
    let (Some(tr_z), Some(vol_z), Some(close_pos)) = (ctx.tr_z, ctx.vol_z, ctx.bar.close_position)
    else {
        return CheckResult::NONE;
    };
    if tr_z < tr_threshold || vol_z < vol_threshold || close_pos < close_pos_floor {
        return CheckResult::NONE;
    }
    if config.require_prior_trend_for_sc_bc && !trend_ok {
        return CheckResult::NONE;
    }
    CheckResult::fire(
        event(ctx, side.climax(), vol_z),
        Delta::Climax {
            side,
            reaction_deadline: (ctx.index + config.min_bars_in_range).saturating_sub(1),
            extreme,
        },
    )
}

pub fn check_sc(ctx: &BarContext<'_>, state: &DetectorState, config: &DetectorConfig) -> CheckResult {
    if !state.tracker(EventLabel::Sc).is_open() {
        return CheckResult::NONE;
    }
    climax(
        ctx,
        Side::Selling,
        config.sc_tr_z,
        config.sc_vol_z,
        SC_CLOSE_POS,
        state.sma_slope.is_some_and(|s| s < 0.0),
        ctx.bar.low,
        config,
    )
}

pub fn check_bc(ctx: &BarContext<'_>, state: &DetectorState, config: &DetectorConfig) -> CheckResult {
    if !state.tracker(EventLabel::Bc).is_open() {
        return CheckResult::NONE;
    }
    climax(
        ctx,
        Side::Buying,
        config.bc_tr_z,
        config.bc_vol_z,
        BC_CLOSE_POS,
        state.sma_slope.is_some_and(|s| s > 0.0),
        ctx.bar.high,
        config,
    )
}

fn reaction(
    ctx: &BarContext<'_>,
    state: &DetectorState,
    config: &DetectorConfig,
    side: Side,
    reverses: fn(close: f64, prev_close: f64) -> bool,
    level: f64,
) -> CheckResult {
    let tracker = state.tracker(side.reaction());
    if state.tracker(side.climax()).emitted.is_none()
        || !tracker.is_open()
        || !tracker.within_deadline(ctx.index)
    {
        return CheckResult::NONE;
    }
    let (Some(prev_close), Some(tr_z)) = (state.prev_close, ctx.tr_z) else {
        return CheckResult::NONE;
    };
    if !reverses(ctx.bar.close, prev_close) || tr_z <= AR_TR_Z {
        return CheckResult::NONE;
    }
    CheckResult::fire(
        event(ctx, side.reaction(), tr_z),
        Delta::Reaction {
            side,
            level,
            follow_up_deadline: ctx.index + config.long_window(),
        },
    )
}

pub fn check_ar(ctx: &BarContext<'_>, state: &DetectorState, config: &DetectorConfig) -> CheckResult {
    let level = state.low_since_sc.unwrap_or(ctx.bar.low);
    reaction(ctx, state, config, Side::Selling, |c, p| c > p, level)
}

pub fn check_ar_top(
    ctx: &BarContext<'_>,
    state: &DetectorState,
    config: &DetectorConfig,
) -> CheckResult {
    let level = state.high_since_bc.unwrap_or(ctx.bar.high);
    reaction(ctx, state, config, Side::Buying, |c, p| c < p, level)
}

/// Geometry of one false-breakout test (Spring against support, Upthrust
/// against resistance).
struct FalseBreakout {
    label: EventLabel,
    /// The bar pierces the level by the configured percentage.
    broke: bool,
    /// The close is back on the range side of the level.
    reclaimed: bool,
    /// Close-position and z-score filters pass; carries the score.
    qualifies: Option<f64>,
    reentry_bars: usize,
}

fn false_breakout(
    ctx: &BarContext<'_>,
    state: &DetectorState,
    config: &DetectorConfig,
    pending: &Reentry,
    test: FalseBreakout,
) -> CheckResult {
    let tracker = state.tracker(test.label);
    if !tracker.is_open() || !tracker.within_deadline(ctx.index) {
        return CheckResult::NONE;
    }

    let mut reentry = None;
    if let Some(candidate) = pending.candidate() {
        if ctx.index > candidate.deadline {
            reentry = Some(Reentry::Idle);
        } else if test.reclaimed {
            // Confirmed late: the event keeps the breakout bar's index, date and score.
            return CheckResult {
                reentry: Some(Reentry::Idle),
                firing: Some(Firing {
                    event: Event {
                        index: candidate.index,
                        date: candidate.date,
                        label: test.label,
                        score: candidate.score,
                    },
                    delta: Delta::Mark,
                }),
            };
        }
    }

    if ctx.index >= config.min_bars_in_range && test.broke {
        if let Some(score) = test.qualifies {
            if test.reclaimed {
                return CheckResult {
                    reentry,
                    firing: Some(Firing {
                        event: event(ctx, test.label, score),
                        delta: Delta::Mark,
                    }),
                };
            }
            reentry = Some(Reentry::Awaiting(ReentryCandidate {
                index: ctx.index,
                date: ctx.date(),
                score,
                deadline: ctx.index + test.reentry_bars,
            }));
        }
    }

    CheckResult {
        reentry,
        firing: None,
    }
}

pub fn check_spring(
    ctx: &BarContext<'_>,
    state: &DetectorState,
    config: &DetectorConfig,
) -> CheckResult {
    let Some(support) = state.support else {
        return CheckResult::NONE;
    };
    let bar = ctx.bar;
    let qualifies = match (bar.close_position, ctx.vol_z) {
        (Some(cp), Some(vol_z)) if cp >= config.spring_close_pos && vol_z >= config.spring_vol_z => {
            Some(vol_z)
        }
        _ => None,
    };
    false_breakout(
        ctx,
        state,
        config,
        &state.spring_reentry,
        FalseBreakout {
            label: EventLabel::Spring,
            broke: bar.low < support * (1.0 - config.spring_break_pct),
            reclaimed: bar.close >= support,
            qualifies,
            reentry_bars: config.spring_reentry_bars,
        },
    )
}

pub fn check_ut(ctx: &BarContext<'_>, state: &DetectorState, config: &DetectorConfig) -> CheckResult {
    let Some(resistance) = state.resistance else {
        return CheckResult::NONE;
    };
    let bar = ctx.bar;
    // The upthrust score is the true-range z-score, NaN when undefined.
    let qualifies = bar
        .close_position
        .filter(|&cp| cp <= config.ut_close_pos)
        .map(|_| ctx.tr_z.unwrap_or(f64::NAN));
    false_breakout(
        ctx,
        state,
        config,
        &state.ut_reentry,
        FalseBreakout {
            label: EventLabel::Ut,
            broke: bar.high > resistance * (1.0 + config.ut_break_pct),
            reclaimed: bar.close <= resistance,
            qualifies,
            reentry_bars: config.ut_reentry_bars,
        },
    )
}

fn sign(
    ctx: &BarContext<'_>,
    state: &DetectorState,
    label: EventLabel,
    beyond_level: bool,
    threshold: f64,
) -> CheckResult {
    let tracker = state.tracker(label);
    if !tracker.is_open() || !tracker.within_deadline(ctx.index) {
        return CheckResult::NONE;
    }
    match ctx.tr_z {
        Some(tr_z) if beyond_level && tr_z >= threshold => {
            CheckResult::fire(event(ctx, label, tr_z), Delta::Mark)
        }
        _ => CheckResult::NONE,
    }
}

pub fn check_sos(ctx: &BarContext<'_>, state: &DetectorState, config: &DetectorConfig) -> CheckResult {
    match state.resistance {
        Some(resistance) => sign(
            ctx,
            state,
            EventLabel::Sos,
            ctx.bar.close > resistance,
            config.sos_tr_z,
        ),
        None => CheckResult::NONE,
    }
}

pub fn check_sow(ctx: &BarContext<'_>, state: &DetectorState, config: &DetectorConfig) -> CheckResult {
    match state.support {
        Some(support) => sign(
            ctx,
            state,
            EventLabel::Sow,
            ctx.bar.close < support,
            config.sow_tr_z,
        ),
        None => CheckResult::NONE,
    }
}
