//! Outcome tracking for recurring operations.
//!
//! Heartbeats and reconnect attempts repeat forever; logging every repetition
//! floods the log during a long outage. [`TransitionTracker`] remembers the
//! last outcome so callers log only when it changes.

/// Outcome of one iteration of a recurring operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Healthy,
    Failing,
}

/// Remembers the last observed [`Outcome`].
#[derive(Debug, Default)]
pub struct TransitionTracker {
    last: Option<Outcome>,
}

impl TransitionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `outcome`; returns `true` if it differs from the previous one.
    pub fn observe(&mut self, outcome: Outcome) -> bool {
        let changed = self.last != Some(outcome);
        self.last = Some(outcome);
        changed
    }

    pub fn last(&self) -> Option<Outcome> {
        self.last
    }
}
