//! Regime state machine driven by emitted events.
//!
//! Each emitted label proposes a target regime. The proposal is then checked
//! against a guard table keyed by (current regime, firing label):
//!
//! | current        | firing label | rule          |
//! |----------------|--------------|---------------|
//! | UNKNOWN        | any          | accept        |
//! | ACCUMULATION   | any          | accept        |
//! | MARKUP         | BC           | accept        |
//! | MARKUP         | other        | wrong escape  |
//! | DISTRIBUTION   | SOW          | accept        |
//! | DISTRIBUTION   | other        | needs hold    |
//! | MARKDOWN       | SC           | accept        |
//! | MARKDOWN       | other        | needs hold    |
//!
//! "needs hold" accepts only once the regime has been held for
//! `min_hold` bars.

use super::state::LastEvents;
use crate::domain::{EventLabel, Regime};

/// Bars within which an SC/AR/SPRING must precede an SOS for it to mark up.
pub const SOS_CONFIRM_WINDOW: usize = 60;
/// Bars within which a BC/SOW vetoes an SOS markup.
pub const SOS_CONFLICT_WINDOW: usize = 60;

/// Guard rule for a (current regime, firing label) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Accept,
    NeedsHold,
    WrongEscape,
}

pub fn rule(current: Regime, label: EventLabel) -> Rule {
    use EventLabel::{Bc, Sc, Sow};
    match (current, label) {
        (Regime::Unknown | Regime::Accumulation, _) => Rule::Accept,
        (Regime::Markup, Bc) => Rule::Accept,
        (Regime::Markup, _) => Rule::WrongEscape,
        (Regime::Distribution, Sow) | (Regime::Markdown, Sc) => Rule::Accept,
        (Regime::Distribution | Regime::Markdown, _) => Rule::NeedsHold,
    }
}

/// Outcome of offering one event to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Accepted { from: Regime, to: Regime },
    /// The label proposes no regime in the current context.
    NoProposal,
    SameState,
    WrongEscape { current: Regime, proposed: Regime },
    NeedsHold { current: Regime, held: usize, required: usize },
}

impl Transition {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Transition::Accepted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegimeMachine {
    current: Regime,
    held: usize,
    min_hold: usize,
}

impl RegimeMachine {
    pub fn new(min_hold: usize) -> Self {
        Self {
            current: Regime::Unknown,
            held: 0,
            min_hold,
        }
    }

    pub fn current(&self) -> Regime {
        self.current
    }

    /// Bars since the last accepted transition (or since start).
    pub fn held(&self) -> usize {
        self.held
    }

    /// Advance the held-bars counter; called once per processed bar.
    pub fn tick(&mut self) {
        self.held += 1;
    }

    /// Target regime proposed by `label`, before guards.
    pub fn propose(&self, label: EventLabel, index: usize, history: &LastEvents) -> Option<Regime> {
        match label {
            EventLabel::Sow => Some(Regime::Markdown),
            EventLabel::Bc | EventLabel::ArTop | EventLabel::Ut => Some(Regime::Distribution),
            EventLabel::Sc | EventLabel::Ar => Some(Regime::Accumulation),
            EventLabel::Spring => {
                (!matches!(self.current, Regime::Distribution | Regime::Markdown))
                    .then_some(Regime::Markup)
            }
            EventLabel::Sos => self
                .sos_conditioned(index, history)
                .then_some(Regime::Markup),
        }
    }

    fn sos_conditioned(&self, index: usize, history: &LastEvents) -> bool {
        let recent_good = [EventLabel::Sc, EventLabel::Ar, EventLabel::Spring]
            .into_iter()
            .any(|l| history.within(l, index, SOS_CONFIRM_WINDOW));
        let recent_conflict = [EventLabel::Bc, EventLabel::Sow]
            .into_iter()
            .any(|l| history.within(l, index, SOS_CONFLICT_WINDOW));
        recent_good
            && !recent_conflict
            && matches!(self.current, Regime::Accumulation | Regime::Markup)
    }

    /// Offer an emitted event; applies the transition if the guards allow it.
    pub fn on_event(&mut self, label: EventLabel, index: usize, history: &LastEvents) -> Transition {
        let Some(proposed) = self.propose(label, index, history) else {
            return Transition::NoProposal;
        };
        if proposed == self.current {
            return Transition::SameState;
        }
        match rule(self.current, label) {
            Rule::WrongEscape => Transition::WrongEscape {
                current: self.current,
                proposed,
            },
            Rule::NeedsHold if self.held < self.min_hold => Transition::NeedsHold {
                current: self.current,
                held: self.held,
                required: self.min_hold,
            },
            Rule::Accept | Rule::NeedsHold => {
                let from = self.current;
                self.current = proposed;
                self.held = 0;
                Transition::Accepted { from, to: proposed }
            }
        }
    }
}
