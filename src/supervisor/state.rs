//! Run state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the supervised script process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    /// No process. Initial state, and the state after every run.
    #[default]
    Idle,
    /// Spawn requested, not yet confirmed by the OS.
    Starting,
    /// The process is live.
    Running,
}

impl RunState {
    /// Whether moving from `self` to `next` follows the run lifecycle.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Starting)
                | (Self::Starting, Self::Running | Self::Idle)
                | (Self::Running, Self::Idle)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
        };
        f.write_str(name)
    }
}

/// State machine tracking the current run.
#[derive(Debug, Clone, Default)]
pub struct RunStateMachine {
    state: RunState,
    runs_started: u64,
}

impl RunStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Move to `new_state`.
    ///
    /// Returns `false` and leaves the state alone if the move skips a step
    /// of the lifecycle.
    pub fn transition(&mut self, new_state: RunState) -> bool {
        if !self.state.can_transition_to(new_state) {
            tracing::warn!(from = ?self.state, to = ?new_state, "Rejected state transition");
            return false;
        }
        tracing::debug!(from = ?self.state, to = ?new_state, "State transition");
        if new_state == RunState::Starting {
            self.runs_started = self.runs_started.saturating_add(1);
        }
        self.state = new_state;
        true
    }

    /// Number of runs started over the lifetime of this machine.
    #[must_use]
    pub fn runs_started(&self) -> u64 {
        self.runs_started
    }
}
