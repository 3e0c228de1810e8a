//! Single authoritative countdown for a session.
//!
//! Timed sessions never decrement a counter: every tick recomputes the
//! remaining time from the wall-clock deadline, so delayed or suspended
//! ticks (background tabs, sleeping laptops) and reloads cannot drift.
//! Practice sessions have no deadline and simply lose one step per tick.

use chrono::{DateTime, Utc};

use crate::model::Countdown;
use crate::time::millis_until;

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick {
    pub remaining_ms: u64,
    /// Deadline reached (timed sessions only).
    pub expired: bool,
    /// Practice budget ran out on this tick. Reported once.
    pub budget_exhausted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Idle,
    Running {
        countdown: Countdown,
        remaining_ms: u64,
        budget_notified: bool,
    },
    Stopped {
        remaining_ms: u64,
    },
}

#[derive(Debug, Clone)]
pub struct TimerEngine {
    step_ms: u64,
    state: TimerState,
}

impl TimerEngine {
    /// `step_ms` is the nominal tick interval; only practice budgets use it.
    #[must_use]
    pub fn new(step_ms: u64) -> Self {
        Self {
            step_ms,
            state: TimerState::Idle,
        }
    }

    /// Starts (or restarts) the countdown.
    pub fn start(&mut self, countdown: Countdown, now: DateTime<Utc>) {
        let remaining_ms = countdown.remaining_ms(now);
        self.state = TimerState::Running {
            countdown,
            remaining_ms,
            budget_notified: remaining_ms == 0,
        };
    }

    /// Advances the countdown. Returns `None` unless running.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<TimerTick> {
        let step_ms = self.step_ms;
        let TimerState::Running {
            countdown,
            remaining_ms,
            budget_notified,
        } = &mut self.state
        else {
            return None;
        };

        let next = match countdown {
            Countdown::Deadline { at } => millis_until(*at, now),
            Countdown::Budget { .. } => remaining_ms.saturating_sub(step_ms),
        };
        // A clock that jumps backwards must not hand time back.
        *remaining_ms = next.min(*remaining_ms);

        let is_deadline = matches!(countdown, Countdown::Deadline { .. });
        let budget_exhausted = !is_deadline && *remaining_ms == 0 && !*budget_notified;
        if budget_exhausted {
            *budget_notified = true;
        }

        Some(TimerTick {
            remaining_ms: *remaining_ms,
            expired: is_deadline && *remaining_ms == 0,
            budget_exhausted,
        })
    }

    /// Stops ticking and freezes the remaining time.
    pub fn stop(&mut self) {
        if let TimerState::Running { remaining_ms, .. } = self.state {
            self.state = TimerState::Stopped { remaining_ms };
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self.state, TimerState::Running { .. })
    }

    #[must_use]
    pub fn remaining_ms(&self) -> Option<u64> {
        match self.state {
            TimerState::Idle => None,
            TimerState::Running { remaining_ms, .. } | TimerState::Stopped { remaining_ms } => {
                Some(remaining_ms)
            }
        }
    }
}
