//! Pending-confirmation sub-machine for Springs and Upthrusts.
//!
//! A breakout bar whose close has not yet returned inside the range parks a
//! candidate here. The candidate is confirmed by the first later bar whose
//! close reclaims the level, or dropped once its reentry deadline passes.

use chrono::NaiveDate;

/// The breakout bar awaiting a reentry close.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReentryCandidate {
    pub index: usize,
    pub date: NaiveDate,
    pub score: f64,
    /// Last bar index on which a reclaiming close still confirms.
    pub deadline: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Reentry {
    #[default]
    Idle,
    Awaiting(ReentryCandidate),
}

impl Reentry {
    pub fn candidate(&self) -> Option<&ReentryCandidate> {
        match self {
            Reentry::Idle => None,
            Reentry::Awaiting(c) => Some(c),
        }
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self, Reentry::Awaiting(_))
    }

    pub(crate) fn clear(&mut self) {
        *self = Reentry::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_returns_to_idle() {
        let mut r = Reentry::Awaiting(ReentryCandidate {
            index: 4,
            date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            score: 1.1,
            deadline: 6,
        });
        assert!(r.is_awaiting());
        assert_eq!(r.candidate().map(|c| c.index), Some(4));
        r.clear();
        assert_eq!(r, Reentry::Idle);
        assert!(r.candidate().is_none());
    }
}
