use std::sync::Arc;

use chrono::{DateTime, Utc};
use exam_core::model::{
    AnswerPayload, AssessmentDefinition, Countdown, EngineSettings, PartNumber, PartRecord,
    PhaseTransition, QuestionId, QuestionPhase, RecoverySnapshot, Session, SessionMode,
    SessionStatus,
};
use exam_core::time::millis_until;
use exam_core::{
    AnswerLedger, Clock, PartExpiry, PartNavigator, Progress, TimerEngine, TimerTick,
};
use tracing::{debug, info, warn};

use super::outcome::{
    PartAdvance, RecoveryChoice, RecoveryPrompt, RecoveryResolution, StartOutcome, TickOutcome,
};
use crate::error::{SessionError, SubmissionError, TransitionRejected};
use crate::recovery::{RecoveryStore, RecoveryWriter, SavePolicy, SaveTrigger};
use crate::submission::{SubmissionPayload, SubmissionReceipt, SubmissionService};

/// Collaborators a controller needs; shared across attempts.
#[derive(Clone)]
pub struct SessionDeps {
    pub recovery: Arc<RecoveryStore>,
    pub submitter: Arc<dyn SubmissionService>,
    pub settings: EngineSettings,
    pub clock: Clock,
}

/// Drained answers handed out by `begin_submission`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionTicket {
    payload: SubmissionPayload,
}

impl SubmissionTicket {
    #[must_use]
    pub fn payload(&self) -> &SubmissionPayload {
        &self.payload
    }
}

//
// ─── CONTROLLER ────────────────────────────────────────────────────────────────
//

/// Owner of one attempt at an assessment.
///
/// Composes the timer, the part navigator and the answer ledger, and decides
/// when the attempt is persisted and submitted. The UI holds the controller
/// (or a `SessionRunner` around it) and calls into it; nothing here is global.
pub struct SessionController {
    definition: AssessmentDefinition,
    mode: SessionMode,
    clock: Clock,
    last_seen: Option<DateTime<Utc>>,
    settings: EngineSettings,
    session: Session,
    ledger: AnswerLedger,
    navigator: PartNavigator,
    timer: TimerEngine,
    save_policy: SavePolicy,
    recovery: Arc<RecoveryStore>,
    writer: RecoveryWriter,
    submitter: Arc<dyn SubmissionService>,
    pending_recovery: Option<RecoverySnapshot>,
    submission_in_flight: bool,
    submit_due: bool,
    awaiting_final_capture: bool,
    receipt: Option<SubmissionReceipt>,
}

impl SessionController {
    /// Creates a controller in `NotStarted`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime, since the recovery writer
    /// task is spawned here.
    #[must_use]
    pub fn new(definition: AssessmentDefinition, mode: SessionMode, deps: SessionDeps) -> Self {
        let now = deps.clock.now();
        let session = Session::new(
            definition.id().clone(),
            mode,
            definition.total_duration_ms(),
            now,
        );
        let ledger = AnswerLedger::from_definition(&definition);
        let navigator = PartNavigator::new(mode, &ledger);
        let writer = RecoveryWriter::spawn(Arc::clone(&deps.recovery));
        Self {
            definition,
            mode,
            clock: deps.clock,
            last_seen: None,
            timer: TimerEngine::new(deps.settings.tick_interval_ms()),
            save_policy: SavePolicy::from_secs(deps.settings.autosave_interval_secs()),
            settings: deps.settings,
            session,
            ledger,
            navigator,
            recovery: deps.recovery,
            writer,
            submitter: deps.submitter,
            pending_recovery: None,
            submission_in_flight: false,
            submit_due: false,
            awaiting_final_capture: false,
            receipt: None,
        }
    }

    /// Looks for an unfinished attempt; starts fresh if there is none.
    ///
    /// A usable snapshot is held back and summarized in
    /// `StartOutcome::RecoveryAvailable`; the session stays `NotStarted` until
    /// `resolve_recovery` is called.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyStarted` unless the session is `NotStarted`.
    pub async fn start(&mut self) -> Result<StartOutcome, SessionError> {
        if self.session.status() != SessionStatus::NotStarted {
            return Err(SessionError::AlreadyStarted);
        }
        let now = self.now();
        let assessment_id = self.definition.id().clone();

        match self.recovery.load_at(&assessment_id, now).await {
            Ok(Some(snapshot)) => {
                let prompt = Self::prompt_for(&snapshot, now);
                info!(
                    assessment_id = %assessment_id,
                    answered = prompt.answered_count,
                    total = prompt.total_count,
                    time_remaining_ms = prompt.time_remaining_ms,
                    "unfinished attempt found"
                );
                self.pending_recovery = Some(snapshot);
                return Ok(StartOutcome::RecoveryAvailable(prompt));
            }
            Ok(None) => {}
            Err(err) => {
                warn!(assessment_id = %assessment_id, error = %err, "recovery lookup failed; starting fresh");
            }
        }

        self.begin_fresh(now);
        Ok(StartOutcome::Fresh)
    }

    /// Applies the user's answer to the recovery prompt.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoPendingRecovery` if `start` did not offer a
    /// snapshot, `SessionError::StaleSnapshot` if it expired while the prompt
    /// was open, and `SessionError::Storage` if a restart cannot clear it.
    pub async fn resolve_recovery(
        &mut self,
        choice: RecoveryChoice,
    ) -> Result<RecoveryResolution, SessionError> {
        let snapshot = self
            .pending_recovery
            .take()
            .ok_or(SessionError::NoPendingRecovery)?;

        match choice {
            RecoveryChoice::Continue => {
                let outcome = self.restore(snapshot)?;
                Ok(RecoveryResolution::Resumed(outcome))
            }
            RecoveryChoice::Restart => {
                self.writer.clear(self.definition.id()).await?;
                let now = self.now();
                self.begin_fresh(now);
                Ok(RecoveryResolution::Restarted)
            }
            RecoveryChoice::Cancel => {
                self.pending_recovery = Some(snapshot);
                Ok(RecoveryResolution::Cancelled)
            }
        }
    }

    /// Hydrates the attempt from a snapshot and catches up on any part
    /// deadlines that passed while it was closed.
    ///
    /// Remaining time comes from the stored deadline, never from the stored
    /// remaining-time field. The snapshot's mode replaces the requested one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyStarted` unless the session is
    /// `NotStarted`, and `SessionError::StaleSnapshot` if the snapshot is for
    /// another assessment or its deadline has passed.
    pub fn restore(&mut self, snapshot: RecoverySnapshot) -> Result<TickOutcome, SessionError> {
        if self.session.status() != SessionStatus::NotStarted {
            return Err(SessionError::AlreadyStarted);
        }
        let now = self.now();
        if !snapshot.is_usable_for(self.definition.id(), now) {
            return Err(SessionError::StaleSnapshot);
        }

        self.mode = snapshot.mode;
        self.session = snapshot.session();
        self.session.transition(SessionStatus::Active);
        self.ledger = AnswerLedger::from_parts(snapshot.parts);
        self.navigator = PartNavigator::restore(self.mode, snapshot.current_part, &self.ledger);
        self.timer = TimerEngine::new(self.settings.tick_interval_ms());
        self.timer.start(self.session.countdown(), now);
        self.save_policy.reset();
        self.pending_recovery = None;
        self.last_seen = Some(now);
        self.reset_submission_state();
        // A closed final part means a forced submission never went through.
        let final_part_closed = self.mode == SessionMode::Timed
            && self.ledger.parts().last().is_some_and(PartRecord::is_locked);
        self.submit_due = self.session.status() == SessionStatus::Expired || final_part_closed;

        info!(
            assessment_id = %self.definition.id(),
            mode = self.mode.as_str(),
            part = %self.navigator.current(),
            remaining_ms = self.session.remaining_ms(now),
            "session restored"
        );

        let catch_up = TimerTick {
            remaining_ms: self.session.remaining_ms(now),
            expired: matches!(self.session.countdown(), Countdown::Deadline { .. })
                && self.session.remaining_ms(now) == 0,
            budget_exhausted: false,
        };
        Ok(self.apply_tick(now, catch_up, 0))
    }

    //
    // ─── TICKS ─────────────────────────────────────────────────────────────────
    //

    /// Advances every clock of the attempt to `now`.
    ///
    /// Part expiry is handled once per expired part in ascending order, so a
    /// long gap between ticks (suspended tab) catches up in one call. Ticks are
    /// ignored while a submission is in flight.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        let now = self.observe(now);
        if self.submission_in_flight {
            return TickOutcome::suspended(self.session.remaining_ms(now));
        }
        let Some(tick) = self.timer.tick(now) else {
            return TickOutcome::suspended(self.session.remaining_ms(now));
        };
        let step_ms = self.settings.tick_interval_ms();
        self.apply_tick(now, tick, step_ms)
    }

    fn apply_tick(&mut self, now: DateTime<Utc>, tick: TimerTick, step_ms: u64) -> TickOutcome {
        let mut outcome = TickOutcome {
            remaining_ms: tick.remaining_ms,
            budget_exhausted: tick.budget_exhausted,
            ..TickOutcome::default()
        };

        match self.mode {
            SessionMode::Timed => {
                outcome.advanced = self.catch_up_parts(now);
                self.navigator.sync_timed_part_clock(
                    &mut self.ledger,
                    self.session.started_at(),
                    tick.remaining_ms,
                    now,
                );
            }
            SessionMode::Practice => {
                self.session.set_budget_left_ms(tick.remaining_ms);
                self.navigator
                    .tick_practice_part_clock(&mut self.ledger, step_ms);
            }
        }
        outcome.question_events = self.ledger.advance_question_timers(now);

        if tick.budget_exhausted {
            info!(assessment_id = %self.definition.id(), "practice time budget used up");
        }
        if tick.expired && self.session.status() == SessionStatus::Active {
            self.expire();
            outcome.expired = true;
        }
        let closed_final_part = self.close_final_part_when_idle();

        let transitioned = !outcome.advanced.is_empty()
            || !outcome.question_events.is_empty()
            || outcome.expired
            || closed_final_part;
        let trigger = if transitioned {
            SaveTrigger::Transition
        } else {
            SaveTrigger::Interval
        };
        outcome.persisted = self.persist(trigger, now);
        outcome.submit_due = self.submit_due;
        outcome
    }

    fn catch_up_parts(&mut self, now: DateTime<Utc>) -> Vec<PartAdvance> {
        let started_at = self.session.started_at();
        let mut advanced = Vec::new();
        loop {
            let current = self.navigator.current();
            if self.ledger.is_part_locked(current) || self.awaiting_final_capture {
                break;
            }
            let Some(deadline) = PartNavigator::part_deadline(started_at, &self.ledger, current)
            else {
                break;
            };
            if now < deadline {
                break;
            }
            match self.navigator.on_part_timer_expired(&mut self.ledger, current) {
                PartExpiry::Advanced { from, to } => {
                    info!(
                        assessment_id = %self.definition.id(),
                        from = %from,
                        to = %to,
                        "part time elapsed; advancing"
                    );
                    advanced.push(PartAdvance { from, to });
                }
                PartExpiry::FinalPart(part) => {
                    if !self.submit_due {
                        info!(assessment_id = %self.definition.id(), part = %part, "final part time elapsed");
                        self.awaiting_final_capture = true;
                    }
                    break;
                }
                PartExpiry::Ignored => break,
            }
        }
        advanced
    }

    /// Closes the last part once nothing is mid-capture. The global deadline
    /// does not use this path; it closes the part unconditionally.
    fn close_final_part_when_idle(&mut self) -> bool {
        if !self.awaiting_final_capture || self.session.status() != SessionStatus::Active {
            return false;
        }
        if self.ledger.capture_in_progress(self.navigator.current()) {
            return false;
        }
        self.navigator.close_current(&mut self.ledger);
        self.awaiting_final_capture = false;
        self.submit_due = true;
        info!(assessment_id = %self.definition.id(), "final part closed; submission due");
        true
    }

    fn expire(&mut self) {
        self.session.transition(SessionStatus::Expired);
        self.navigator.close_current(&mut self.ledger);
        self.timer.stop();
        self.awaiting_final_capture = false;
        self.submit_due = true;
        info!(assessment_id = %self.definition.id(), "global deadline reached; submission forced");
    }

    //
    // ─── ANSWERS & NAVIGATION ──────────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// Returns `SessionError::Rejected` if the ledger refuses the answer or, in
    /// timed mode, the question is in a part not reached yet. Returns a
    /// lifecycle error if the session is not accepting answers.
    pub fn set_answer(&mut self, id: &QuestionId, payload: AnswerPayload) -> Result<(), SessionError> {
        self.ensure_writable(id)?;
        self.ledger.set_answer(id, payload).map_err(rejected)?;
        let now = self.now();
        self.persist(SaveTrigger::Transition, now);
        Ok(())
    }

    /// # Errors
    ///
    /// Same as `set_answer`.
    pub fn mark_phase(
        &mut self,
        id: &QuestionId,
        phase: QuestionPhase,
    ) -> Result<PhaseTransition, SessionError> {
        self.ensure_writable(id)?;
        let transition = self.ledger.mark_phase(id, phase).map_err(rejected)?;
        if transition == PhaseTransition::Advance {
            let now = self.now();
            self.persist(SaveTrigger::Transition, now);
        }
        Ok(transition)
    }

    /// Starts the preparation (or response) window of a question.
    ///
    /// # Errors
    ///
    /// Same as `set_answer`.
    pub fn begin_question(&mut self, id: &QuestionId) -> Result<QuestionPhase, SessionError> {
        self.ensure_writable(id)?;
        let now = self.now();
        let phase = self.ledger.begin_question(id, now).map_err(rejected)?;
        self.persist(SaveTrigger::Transition, now);
        Ok(phase)
    }

    /// # Errors
    ///
    /// Same as `set_answer`.
    pub fn re_record(&mut self, id: &QuestionId) -> Result<(), SessionError> {
        self.ensure_writable(id)?;
        let now = self.now();
        self.ledger.re_record(id, now).map_err(rejected)?;
        self.persist(SaveTrigger::Transition, now);
        Ok(())
    }

    /// User-initiated part change (practice mode only).
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Rejected` in timed mode or for an unknown part.
    pub fn go_to(&mut self, part: PartNumber) -> Result<PartNumber, SessionError> {
        self.ensure_accepting()?;
        let current = self.navigator.go_to(&self.ledger, part).map_err(rejected)?;
        let now = self.now();
        self.persist(SaveTrigger::Transition, now);
        Ok(current)
    }

    //
    // ─── SUBMISSION ────────────────────────────────────────────────────────────
    //

    /// Drains the ledger and raises the in-flight guard.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SubmissionInFlight` while another submission is
    /// pending, and a lifecycle error before start or after completion.
    pub fn begin_submission(&mut self) -> Result<SubmissionTicket, SessionError> {
        match self.session.status() {
            SessionStatus::NotStarted => return Err(SessionError::NotStarted),
            SessionStatus::Completed => return Err(SessionError::NotActive),
            SessionStatus::Active | SessionStatus::Expired => {}
        }
        if self.submission_in_flight {
            return Err(SessionError::SubmissionInFlight);
        }

        let now = self.now();
        self.submission_in_flight = true;
        self.submit_due = false;
        let payload = SubmissionPayload {
            assessment_id: self.definition.id().clone(),
            duration_ms: self.elapsed_ms(now),
            answers: self.ledger.drain(),
        };
        info!(
            assessment_id = %payload.assessment_id,
            duration_ms = payload.duration_ms,
            answers = payload.answers.len(),
            "submitting attempt"
        );
        Ok(SubmissionTicket { payload })
    }

    /// Settles the submission started by `begin_submission`.
    ///
    /// On success the attempt is completed and its recovery entry cleared. On
    /// failure the state and the recovery entry are kept for a retry.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submission` with the failure, or
    /// `SessionError::NotActive` if no submission was in flight.
    pub async fn complete_submission(
        &mut self,
        result: Result<SubmissionReceipt, SubmissionError>,
    ) -> Result<SubmissionReceipt, SessionError> {
        if !self.submission_in_flight {
            return Err(SessionError::NotActive);
        }
        self.submission_in_flight = false;

        match result {
            Ok(receipt) => {
                self.ledger.mark_all_submitted();
                self.session.transition(SessionStatus::Completed);
                self.timer.stop();
                self.awaiting_final_capture = false;
                if let Err(err) = self.writer.clear(self.definition.id()).await {
                    warn!(assessment_id = %self.definition.id(), error = %err, "recovery entry not cleared");
                }
                info!(
                    assessment_id = %self.definition.id(),
                    result_id = %receipt.result_id,
                    "attempt submitted"
                );
                self.receipt = Some(receipt.clone());
                Ok(receipt)
            }
            Err(err) => {
                warn!(assessment_id = %self.definition.id(), error = %err, "submission failed");
                let now = self.now();
                self.persist(SaveTrigger::Transition, now);
                Err(SessionError::Submission(err))
            }
        }
    }

    /// Submits in place: `begin_submission`, the service call, then
    /// `complete_submission`.
    ///
    /// # Errors
    ///
    /// See `begin_submission` and `complete_submission`.
    pub async fn submit(&mut self) -> Result<SubmissionReceipt, SessionError> {
        let ticket = self.begin_submission()?;
        let result = self.submitter.submit(ticket.payload()).await;
        self.complete_submission(result).await
    }

    //
    // ─── PERSISTENCE ───────────────────────────────────────────────────────────
    //

    /// Leaving the exam view: stops the timer and queues one last save.
    pub fn suspend(&mut self) {
        self.timer.stop();
        if matches!(
            self.session.status(),
            SessionStatus::Active | SessionStatus::Expired
        ) {
            let now = self.now();
            self.writer.save(self.snapshot(now));
            debug!(assessment_id = %self.definition.id(), "session suspended");
        }
    }

    /// Waits for queued recovery writes to land.
    pub async fn flush_persistence(&self) {
        self.writer.flush().await;
    }

    #[must_use]
    pub fn snapshot(&self, now: DateTime<Utc>) -> RecoverySnapshot {
        RecoverySnapshot::capture(
            &self.session,
            self.definition.title(),
            self.navigator.current(),
            self.ledger.parts(),
            now,
        )
    }

    fn persist(&mut self, trigger: SaveTrigger, now: DateTime<Utc>) -> bool {
        if !matches!(
            self.session.status(),
            SessionStatus::Active | SessionStatus::Expired
        ) {
            return false;
        }
        if !self.save_policy.should_save(trigger, now) {
            return false;
        }
        self.writer.save(self.snapshot(now));
        true
    }

    //
    // ─── ACCESSORS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn definition(&self) -> &AssessmentDefinition {
        &self.definition
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    #[must_use]
    pub fn ledger(&self) -> &AnswerLedger {
        &self.ledger
    }

    #[must_use]
    pub fn current_part(&self) -> PartNumber {
        self.navigator.current()
    }

    #[must_use]
    pub fn is_locked(&self, part: PartNumber) -> bool {
        self.navigator.is_locked(&self.ledger, part)
    }

    #[must_use]
    pub fn progress(&self) -> Progress {
        self.ledger.progress()
    }

    #[must_use]
    pub fn remaining_ms(&self) -> u64 {
        self.timer
            .remaining_ms()
            .unwrap_or_else(|| self.session.remaining_ms(self.now()))
    }

    #[must_use]
    pub fn is_submission_in_flight(&self) -> bool {
        self.submission_in_flight
    }

    #[must_use]
    pub fn is_submit_due(&self) -> bool {
        self.submit_due
    }

    #[must_use]
    pub fn receipt(&self) -> Option<&SubmissionReceipt> {
        self.receipt.as_ref()
    }

    #[must_use]
    pub fn pending_recovery(&self) -> Option<&RecoverySnapshot> {
        self.pending_recovery.as_ref()
    }

    #[must_use]
    pub fn submitter(&self) -> Arc<dyn SubmissionService> {
        Arc::clone(&self.submitter)
    }

    /// The controller's notion of now: the clock, but never earlier than the
    /// latest tick it has seen.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        match self.last_seen {
            Some(seen) if seen > now => seen,
            _ => now,
        }
    }

    //
    // ─── INTERNALS ─────────────────────────────────────────────────────────────
    //

    fn begin_fresh(&mut self, now: DateTime<Utc>) {
        self.session = Session::new(
            self.definition.id().clone(),
            self.mode,
            self.definition.total_duration_ms(),
            now,
        );
        self.session.transition(SessionStatus::Active);
        self.ledger = AnswerLedger::from_definition(&self.definition);
        self.navigator = PartNavigator::new(self.mode, &self.ledger);
        self.timer = TimerEngine::new(self.settings.tick_interval_ms());
        self.timer.start(self.session.countdown(), now);
        self.save_policy.reset();
        self.reset_submission_state();
        self.last_seen = Some(now);

        info!(
            assessment_id = %self.definition.id(),
            attempt_id = %self.session.attempt_id(),
            mode = self.mode.as_str(),
            total_ms = self.definition.total_duration_ms(),
            "session started"
        );
        self.persist(SaveTrigger::Transition, now);
    }

    fn reset_submission_state(&mut self) {
        self.submission_in_flight = false;
        self.submit_due = false;
        self.awaiting_final_capture = false;
        self.receipt = None;
    }

    fn observe(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let now = match self.last_seen {
            Some(seen) if seen > now => seen,
            _ => now,
        };
        self.last_seen = Some(now);
        now
    }

    fn ensure_accepting(&self) -> Result<(), SessionError> {
        match self.session.status() {
            SessionStatus::NotStarted => Err(SessionError::NotStarted),
            _ if self.submission_in_flight => Err(SessionError::SubmissionInFlight),
            status if status.accepts_answers() => Ok(()),
            _ => Err(SessionError::NotActive),
        }
    }

    fn ensure_writable(&self, id: &QuestionId) -> Result<(), SessionError> {
        self.ensure_accepting()?;
        self.navigator
            .ensure_current(&self.ledger, id)
            .map_err(rejected)
    }

    fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        let total = self.definition.total_duration_ms();
        match self.session.countdown() {
            Countdown::Deadline { .. } => millis_until(now, self.session.started_at()).min(total),
            Countdown::Budget { left_ms } => total.saturating_sub(left_ms),
        }
    }

    fn prompt_for(snapshot: &RecoverySnapshot, now: DateTime<Utc>) -> RecoveryPrompt {
        let (answered, total) = snapshot.answered_counts();
        RecoveryPrompt {
            test_title: snapshot.title.clone(),
            progress_percent: Progress { answered, total }.percent(),
            time_remaining_ms: snapshot.remaining_ms(now),
            answered_count: answered,
            total_count: total,
        }
    }
}

fn rejected<E: Into<TransitionRejected>>(err: E) -> SessionError {
    let err = err.into();
    debug!(error = %err, "call rejected");
    SessionError::Rejected(err)
}
