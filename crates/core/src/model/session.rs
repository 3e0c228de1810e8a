use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::ids::AssessmentId;
use crate::time::{duration_ms, millis_until};

/// How strictly a session is timed. Fixed when the session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Free navigation, no locking, cosmetic timers.
    Practice,
    /// Hard deadline, forced part progression, part locking.
    Timed,
}

impl SessionMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionMode::Practice => "practice",
            SessionMode::Timed => "timed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    NotStarted,
    Active,
    /// The global deadline passed; submission is forced but may still be retried.
    Expired,
    Completed,
}

impl SessionStatus {
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (SessionStatus::NotStarted, SessionStatus::Active)
                | (SessionStatus::Active, SessionStatus::Expired | SessionStatus::Completed)
                | (SessionStatus::Expired, SessionStatus::Completed)
        )
    }

    /// Whether answers may still change.
    #[must_use]
    pub fn accepts_answers(self) -> bool {
        matches!(self, SessionStatus::Active)
    }
}

/// Remaining-time model of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Countdown {
    /// Absolute wall-clock deadline (timed mode).
    Deadline { at: DateTime<Utc> },
    /// Remaining budget without a hard deadline (practice mode).
    Budget { left_ms: u64 },
}

impl Countdown {
    #[must_use]
    pub fn for_mode(mode: SessionMode, total_ms: u64, now: DateTime<Utc>) -> Self {
        match mode {
            SessionMode::Timed => Countdown::Deadline {
                at: now + duration_ms(total_ms),
            },
            SessionMode::Practice => Countdown::Budget { left_ms: total_ms },
        }
    }

    /// Remaining milliseconds; never negative.
    #[must_use]
    pub fn remaining_ms(&self, now: DateTime<Utc>) -> u64 {
        match self {
            Countdown::Deadline { at } => millis_until(*at, now),
            Countdown::Budget { left_ms } => *left_ms,
        }
    }

    #[must_use]
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        match self {
            Countdown::Deadline { at } => Some(*at),
            Countdown::Budget { .. } => None,
        }
    }
}

/// One exam-taking attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    attempt_id: Uuid,
    assessment_id: AssessmentId,
    mode: SessionMode,
    status: SessionStatus,
    countdown: Countdown,
    started_at: DateTime<Utc>,
}

impl Session {
    /// Creates a not-yet-started session whose countdown is anchored at `now`.
    #[must_use]
    pub fn new(assessment_id: AssessmentId, mode: SessionMode, total_ms: u64, now: DateTime<Utc>) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            assessment_id,
            mode,
            status: SessionStatus::NotStarted,
            countdown: Countdown::for_mode(mode, total_ms, now),
            started_at: now,
        }
    }

    /// Rehydrates a session from persisted fields.
    #[must_use]
    pub fn from_persisted(
        attempt_id: Uuid,
        assessment_id: AssessmentId,
        mode: SessionMode,
        status: SessionStatus,
        countdown: Countdown,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            attempt_id,
            assessment_id,
            mode,
            status,
            countdown,
            started_at,
        }
    }

    #[must_use]
    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    #[must_use]
    pub fn assessment_id(&self) -> &AssessmentId {
        &self.assessment_id
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn countdown(&self) -> Countdown {
        self.countdown
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn remaining_ms(&self, now: DateTime<Utc>) -> u64 {
        self.countdown.remaining_ms(now)
    }

    /// Applies a status change if the lifecycle allows it.
    ///
    /// Returns `false` (and leaves the status untouched) otherwise.
    pub fn transition(&mut self, next: SessionStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    /// Records the practice budget after a tick. Ignored for deadline sessions.
    pub fn set_budget_left_ms(&mut self, left_ms: u64) {
        if let Countdown::Budget { left_ms: current } = &mut self.countdown {
            *current = left_ms.min(*current);
        }
    }
}
