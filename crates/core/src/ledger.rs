//! Answer accumulation for one session.
//!
//! The ledger owns every `PartRecord` and is the only place question state is
//! mutated. A rejected call never changes anything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    AnswerMetrics, AnswerPayload, AssessmentDefinition, PartNumber, PartRecord, PhaseTransition,
    QuestionId, QuestionPhase, QuestionRecord,
};
use crate::time::duration_ms;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LedgerError {
    #[error("unknown question {id}")]
    UnknownQuestion { id: QuestionId },

    #[error("part {part} is locked")]
    PartLocked { part: PartNumber },

    #[error("question {id} was already submitted")]
    AlreadySubmitted { id: QuestionId },

    #[error("question {id} cannot move from {} to {}", .from.as_str(), .to.as_str())]
    InvalidTransition {
        id: QuestionId,
        from: QuestionPhase,
        to: QuestionPhase,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub answered: usize,
    pub total: usize,
}

impl Progress {
    /// Whole-number percentage, rounded down.
    #[must_use]
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        u8::try_from(self.answered * 100 / self.total).unwrap_or(100)
    }
}

/// One entry of the submission payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainedAnswer {
    pub question_id: QuestionId,
    pub payload: Option<AnswerPayload>,
}

/// Emitted when a question sub-timer fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionTimerEvent {
    /// The preparation window ended; recording should begin.
    CaptureStarted(QuestionId),
    /// The response window ended; the capture widget should stop and report.
    CaptureWindowClosed(QuestionId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerLedger {
    parts: Vec<PartRecord>,
}

impl AnswerLedger {
    #[must_use]
    pub fn from_definition(definition: &AssessmentDefinition) -> Self {
        Self {
            parts: definition
                .parts()
                .iter()
                .map(PartRecord::from_definition)
                .collect(),
        }
    }

    /// Rehydrate from persisted part records.
    #[must_use]
    pub fn from_parts(parts: Vec<PartRecord>) -> Self {
        Self { parts }
    }

    #[must_use]
    pub fn parts(&self) -> &[PartRecord] {
        &self.parts
    }

    #[must_use]
    pub fn part(&self, number: PartNumber) -> Option<&PartRecord> {
        self.parts.iter().find(|p| p.part_number() == number)
    }

    #[must_use]
    pub fn is_part_locked(&self, number: PartNumber) -> bool {
        self.part(number).is_some_and(PartRecord::is_locked)
    }

    #[must_use]
    pub fn question(&self, id: &QuestionId) -> Option<&QuestionRecord> {
        self.parts.iter().find_map(|p| p.question(id))
    }

    /// Part that owns the given question.
    #[must_use]
    pub fn part_of(&self, id: &QuestionId) -> Option<PartNumber> {
        self.parts
            .iter()
            .find(|p| p.question(id).is_some())
            .map(PartRecord::part_number)
    }

    /// Records an answer and moves the question to `Answered`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError` if the question is unknown, its part is locked, or
    /// it was already submitted.
    pub fn set_answer(&mut self, id: &QuestionId, payload: AnswerPayload) -> Result<(), LedgerError> {
        let question = self.writable(id)?;
        if question.phase == QuestionPhase::Submitted {
            return Err(LedgerError::AlreadySubmitted { id: id.clone() });
        }
        question.metrics = AnswerMetrics::from_payload(&payload);
        question.answer = Some(payload);
        question.phase = QuestionPhase::Answered;
        question.phase_deadline = None;
        Ok(())
    }

    /// Moves a question along the phase table. Re-entering the current phase
    /// is accepted and changes nothing.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidTransition` for regressions, or the
    /// unknown/locked errors of `set_answer`.
    pub fn mark_phase(
        &mut self,
        id: &QuestionId,
        phase: QuestionPhase,
    ) -> Result<PhaseTransition, LedgerError> {
        let question = self.writable(id)?;
        match question.phase.transition_to(phase) {
            PhaseTransition::Rejected => Err(LedgerError::InvalidTransition {
                id: id.clone(),
                from: question.phase,
                to: phase,
            }),
            PhaseTransition::Unchanged => Ok(PhaseTransition::Unchanged),
            PhaseTransition::Advance => {
                question.phase = phase;
                if phase != QuestionPhase::Capturing {
                    question.phase_deadline = None;
                }
                Ok(PhaseTransition::Advance)
            }
        }
    }

    /// Starts a question: `Preparing` if it has a preparation window,
    /// otherwise straight to `Capturing`. Deadlines are wall-clock anchored.
    ///
    /// # Errors
    ///
    /// Same as `mark_phase`.
    pub fn begin_question(
        &mut self,
        id: &QuestionId,
        now: DateTime<Utc>,
    ) -> Result<QuestionPhase, LedgerError> {
        let question = self.writable(id)?;
        let (target, window) = match question.prepare_ms {
            Some(prepare) => (QuestionPhase::Preparing, Some(prepare)),
            None => (QuestionPhase::Capturing, question.response_ms),
        };
        if question.phase.transition_to(target) == PhaseTransition::Rejected {
            return Err(LedgerError::InvalidTransition {
                id: id.clone(),
                from: question.phase,
                to: target,
            });
        }
        question.phase = target;
        question.phase_deadline = window.map(|ms| now + duration_ms(ms));
        Ok(target)
    }

    /// Discards the captured answer and restarts capture.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidTransition` unless the question is
    /// capturing or answered, or the unknown/locked errors of `set_answer`.
    pub fn re_record(&mut self, id: &QuestionId, now: DateTime<Utc>) -> Result<(), LedgerError> {
        let question = self.writable(id)?;
        if !question.phase.allows_re_record() {
            return Err(LedgerError::InvalidTransition {
                id: id.clone(),
                from: question.phase,
                to: QuestionPhase::Capturing,
            });
        }
        question.phase = QuestionPhase::Capturing;
        question.answer = None;
        question.metrics = AnswerMetrics::default();
        question.phase_deadline = question.response_ms.map(|ms| now + duration_ms(ms));
        Ok(())
    }

    /// Fires every question sub-timer whose deadline is at or before `now`.
    ///
    /// A preparation window rolls into the response window anchored at the
    /// preparation deadline, so a long gap between calls can fire both.
    pub fn advance_question_timers(&mut self, now: DateTime<Utc>) -> Vec<QuestionTimerEvent> {
        let mut events = Vec::new();
        for part in self.parts.iter_mut().filter(|p| !p.is_locked()) {
            for question in part.questions_mut() {
                let Some(deadline) = question.phase_deadline else {
                    continue;
                };
                if deadline > now {
                    continue;
                }
                if question.phase == QuestionPhase::Preparing {
                    question.phase = QuestionPhase::Capturing;
                    question.phase_deadline = question.response_ms.map(|ms| deadline + duration_ms(ms));
                    events.push(QuestionTimerEvent::CaptureStarted(question.id.clone()));
                }
                if question.phase == QuestionPhase::Capturing {
                    match question.phase_deadline {
                        Some(end) if end <= now => {
                            question.phase_deadline = None;
                            events.push(QuestionTimerEvent::CaptureWindowClosed(question.id.clone()));
                        }
                        _ => {}
                    }
                } else {
                    question.phase_deadline = None;
                }
            }
        }
        events
    }

    #[must_use]
    pub fn progress(&self) -> Progress {
        let (answered, total) = self
            .parts
            .iter()
            .flat_map(PartRecord::questions)
            .fold((0, 0), |(answered, total), q| {
                (answered + usize::from(q.phase.is_answered()), total + 1)
            });
        Progress { answered, total }
    }

    /// Whether any question of `part` is mid-capture.
    #[must_use]
    pub fn capture_in_progress(&self, part: PartNumber) -> bool {
        self.part(part).is_some_and(|p| {
            p.questions()
                .iter()
                .any(|q| matches!(q.phase, QuestionPhase::Preparing | QuestionPhase::Capturing))
        })
    }

    /// Every question in presentation order with its payload, if any.
    /// Pure: calling it repeatedly yields identical results.
    #[must_use]
    pub fn drain(&self) -> Vec<DrainedAnswer> {
        self.parts
            .iter()
            .flat_map(PartRecord::questions)
            .map(|q| DrainedAnswer {
                question_id: q.id.clone(),
                payload: q.answer.clone(),
            })
            .collect()
    }

    /// Marks answered questions as submitted. Runs after a successful
    /// submission, so part locks do not apply.
    pub fn mark_all_submitted(&mut self) {
        for part in &mut self.parts {
            for question in part.questions_mut() {
                if question.phase == QuestionPhase::Answered {
                    question.phase = QuestionPhase::Submitted;
                }
                question.phase_deadline = None;
            }
        }
    }

    /// Updates the displayed remaining time of a part.
    pub fn set_part_time_left(&mut self, number: PartNumber, left_ms: u64) {
        if let Some(part) = self.parts.iter_mut().find(|p| p.part_number() == number) {
            part.set_time_left_ms(left_ms);
        }
    }

    pub(crate) fn lock_part(&mut self, number: PartNumber) -> bool {
        match self.parts.iter_mut().find(|p| p.part_number() == number) {
            Some(part) if !part.is_locked() => {
                part.lock();
                for question in part.questions_mut() {
                    question.phase_deadline = None;
                }
                true
            }
            _ => false,
        }
    }

    fn writable(&mut self, id: &QuestionId) -> Result<&mut QuestionRecord, LedgerError> {
        let part = self
            .parts
            .iter_mut()
            .find(|p| p.question(id).is_some())
            .ok_or_else(|| LedgerError::UnknownQuestion { id: id.clone() })?;
        if part.is_locked() {
            return Err(LedgerError::PartLocked {
                part: part.part_number(),
            });
        }
        part.question_mut(id)
            .ok_or_else(|| LedgerError::UnknownQuestion { id: id.clone() })
    }
}
