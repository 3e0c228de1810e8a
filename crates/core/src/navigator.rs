use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::ledger::AnswerLedger;
use crate::model::{PartNumber, PartRecord, QuestionId, SessionMode};
use crate::time::{duration_ms, millis_until};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NavigationError {
    #[error("parts advance automatically in timed mode")]
    ManualNavigationDisabled,

    #[error("unknown part {part}")]
    UnknownPart { part: PartNumber },

    #[error("part {part} is not the current part")]
    NotCurrentPart { part: PartNumber },
}

/// What happened when a part timer expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartExpiry {
    /// `from` is now locked and `to` is current.
    Advanced { from: PartNumber, to: PartNumber },
    /// The last part ran out; there is nothing to advance to.
    FinalPart(PartNumber),
    /// Practice mode, or the part was not current.
    Ignored,
}

/// Tracks the current part and enforces the navigation rules of the mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartNavigator {
    mode: SessionMode,
    current: PartNumber,
}

impl PartNavigator {
    /// Starts on the first part.
    #[must_use]
    pub fn new(mode: SessionMode, ledger: &AnswerLedger) -> Self {
        let current = ledger
            .parts()
            .first()
            .map_or_else(|| PartNumber::new(1), PartRecord::part_number);
        Self { mode, current }
    }

    /// Resumes on `current`, falling forward to the first unlocked part if the
    /// persisted one is missing or locked.
    #[must_use]
    pub fn restore(mode: SessionMode, current: PartNumber, ledger: &AnswerLedger) -> Self {
        let usable = ledger
            .part(current)
            .is_some_and(|p| !p.is_locked());
        let current = if usable {
            current
        } else {
            ledger
                .parts()
                .iter()
                .find(|p| !p.is_locked())
                .or_else(|| ledger.parts().last())
                .map_or(current, PartRecord::part_number)
        };
        Self { mode, current }
    }

    #[must_use]
    pub fn current(&self) -> PartNumber {
        self.current
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// User-initiated navigation. Practice only.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::ManualNavigationDisabled` in timed mode and
    /// `NavigationError::UnknownPart` for a part that does not exist. Either
    /// way the current part is unchanged.
    pub fn go_to(
        &mut self,
        ledger: &AnswerLedger,
        part: PartNumber,
    ) -> Result<PartNumber, NavigationError> {
        if self.mode == SessionMode::Timed {
            return Err(NavigationError::ManualNavigationDisabled);
        }
        if ledger.part(part).is_none() {
            return Err(NavigationError::UnknownPart { part });
        }
        self.current = part;
        Ok(part)
    }

    /// Handles a part timer running out. In timed mode the current part is
    /// locked and the next one becomes current; anything else is ignored.
    pub fn on_part_timer_expired(
        &mut self,
        ledger: &mut AnswerLedger,
        part: PartNumber,
    ) -> PartExpiry {
        if self.mode != SessionMode::Timed || part != self.current {
            return PartExpiry::Ignored;
        }
        let next = part.next();
        if ledger.part(next).is_none() {
            return PartExpiry::FinalPart(part);
        }
        ledger.lock_part(part);
        self.current = next;
        PartExpiry::Advanced {
            from: part,
            to: next,
        }
    }

    /// Locks the current part without advancing. Used once the final part is
    /// over. Returns `false` if it was already locked or the mode never locks.
    pub fn close_current(&self, ledger: &mut AnswerLedger) -> bool {
        self.mode == SessionMode::Timed && ledger.lock_part(self.current)
    }

    /// In timed mode only questions of the current part may change.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::NotCurrentPart` for a question of a part not
    /// reached yet. Unknown questions and locked parts pass through for the
    /// ledger to report.
    pub fn ensure_current(
        &self,
        ledger: &AnswerLedger,
        id: &QuestionId,
    ) -> Result<(), NavigationError> {
        match ledger.part_of(id) {
            Some(part)
                if self.mode == SessionMode::Timed
                    && part != self.current
                    && !ledger.is_part_locked(part) =>
            {
                Err(NavigationError::NotCurrentPart { part })
            }
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn is_locked(&self, ledger: &AnswerLedger, part: PartNumber) -> bool {
        ledger.is_part_locked(part)
    }

    /// Wall-clock end of `part` in timed mode: session start plus the limits of
    /// every part up to and including it.
    #[must_use]
    pub fn part_deadline(
        started_at: DateTime<Utc>,
        ledger: &AnswerLedger,
        part: PartNumber,
    ) -> Option<DateTime<Utc>> {
        ledger.part(part)?;
        let offset = ledger
            .parts()
            .iter()
            .take_while(|p| p.part_number() <= part)
            .fold(0_u64, |acc, p| acc.saturating_add(p.time_limit_ms()));
        Some(started_at + duration_ms(offset))
    }

    /// Recomputes the current part's remaining time from its deadline.
    pub fn sync_timed_part_clock(
        &self,
        ledger: &mut AnswerLedger,
        started_at: DateTime<Utc>,
        global_remaining_ms: u64,
        now: DateTime<Utc>,
    ) -> Option<u64> {
        let deadline = Self::part_deadline(started_at, ledger, self.current)?;
        let left = millis_until(deadline, now).min(global_remaining_ms);
        ledger.set_part_time_left(self.current, left);
        Some(left)
    }

    /// Cosmetic countdown of the current part in practice mode.
    pub fn tick_practice_part_clock(&self, ledger: &mut AnswerLedger, step_ms: u64) {
        if let Some(left) = ledger.part(self.current).map(PartRecord::time_left_ms) {
            ledger.set_part_time_left(self.current, left.saturating_sub(step_ms));
        }
    }
}
