use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::ids::{AssessmentId, PartNumber};
use crate::model::part::PartRecord;
use crate::model::session::{Countdown, Session, SessionMode, SessionStatus};

/// Persisted serialization of a session, enabling resumption after a reload
/// or crash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverySnapshot {
    pub assessment_id: AssessmentId,
    pub attempt_id: Uuid,
    pub title: String,
    pub mode: SessionMode,
    pub status: SessionStatus,
    pub global_deadline: Option<DateTime<Utc>>,
    /// Remaining time as of `captured_at`. Only trusted for practice sessions;
    /// timed sessions re-derive it from `global_deadline`.
    pub global_time_left_ms: u64,
    pub started_at: DateTime<Utc>,
    pub current_part: PartNumber,
    pub parts: Vec<PartRecord>,
    pub captured_at: DateTime<Utc>,
}

impl RecoverySnapshot {
    #[must_use]
    pub fn capture(
        session: &Session,
        title: &str,
        current_part: PartNumber,
        parts: &[PartRecord],
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            assessment_id: session.assessment_id().clone(),
            attempt_id: session.attempt_id(),
            title: title.to_owned(),
            mode: session.mode(),
            status: session.status(),
            global_deadline: session.countdown().deadline(),
            global_time_left_ms: session.remaining_ms(now),
            started_at: session.started_at(),
            current_part,
            parts: parts.to_vec(),
            captured_at: now,
        }
    }

    /// A snapshot is replayable only for the same assessment and, when it has
    /// a deadline, only strictly before that deadline.
    #[must_use]
    pub fn is_usable_for(&self, assessment_id: &AssessmentId, now: DateTime<Utc>) -> bool {
        if &self.assessment_id != assessment_id {
            return false;
        }
        if self.status == SessionStatus::Completed {
            return false;
        }
        match self.global_deadline {
            Some(deadline) => now < deadline,
            None => true,
        }
    }

    /// Rebuilds the session. Timed sessions keep their original deadline;
    /// practice sessions resume from the stored budget.
    #[must_use]
    pub fn session(&self) -> Session {
        let countdown = match self.global_deadline {
            Some(at) => Countdown::Deadline { at },
            None => Countdown::Budget {
                left_ms: self.global_time_left_ms,
            },
        };
        Session::from_persisted(
            self.attempt_id,
            self.assessment_id.clone(),
            self.mode,
            self.status,
            countdown,
            self.started_at,
        )
    }

    /// Remaining time as seen at `now`.
    #[must_use]
    pub fn remaining_ms(&self, now: DateTime<Utc>) -> u64 {
        self.session().remaining_ms(now)
    }

    /// `(answered, total)` across all parts.
    #[must_use]
    pub fn answered_counts(&self) -> (usize, usize) {
        self.parts
            .iter()
            .flat_map(PartRecord::questions)
            .fold((0, 0), |(answered, total), q| {
                (answered + usize::from(q.phase.is_answered()), total + 1)
            })
    }
}
