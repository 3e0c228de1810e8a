use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use exam_core::model::{
    AnswerPayload, AssessmentDefinition, AssessmentDraft, AssessmentId, AssessmentKind,
    EngineSettings, EngineSettingsDraft, MediaRef, PartDefinition, PartNumber, QuestionDefinition,
    QuestionId, QuestionPhase, SessionMode, SessionStatus,
};
use exam_core::time::fixed_now;
use exam_core::{Clock, LedgerError, NavigationError, QuestionTimerEvent};
use services::{
    PartAdvance, RecoveryChoice, RecoveryResolution, RecoveryStore, SessionCommand,
    SessionController, SessionDeps, SessionError, SessionEvent, SessionRunner, StartOutcome,
    SubmissionError, SubmissionPayload, SubmissionReceipt, SubmissionService, TransitionRejected,
};
use storage::repository::{InMemoryRepository, RecoveryRepository};

const MINUTE: i64 = 60_000;

//
// ─── FIXTURES ──────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct FakeSubmitter {
    fail: AtomicBool,
    calls: Mutex<Vec<SubmissionPayload>>,
}

impl FakeSubmitter {
    fn failing() -> Self {
        let submitter = Self::default();
        submitter.fail.store(true, Ordering::SeqCst);
        submitter
    }

    fn calls(&self) -> Vec<SubmissionPayload> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubmissionService for FakeSubmitter {
    async fn submit(
        &self,
        payload: &SubmissionPayload,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        self.calls.lock().unwrap().push(payload.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(SubmissionError::Unavailable("network unreachable".into()));
        }
        Ok(SubmissionReceipt {
            result_id: format!("result-{}", payload.assessment_id),
            summary: None,
        })
    }
}

fn qid(id: &str) -> QuestionId {
    QuestionId::new(id).unwrap()
}

fn minutes(n: i64) -> DateTime<Utc> {
    fixed_now() + Duration::milliseconds(n * MINUTE)
}

fn writing_part(number: u32, limit_min: u64, ids: &[&str]) -> PartDefinition {
    PartDefinition {
        part_number: PartNumber::new(number),
        time_limit_ms: limit_min * 60_000,
        questions: ids.iter().map(|id| QuestionDefinition::untimed(qid(id))).collect(),
    }
}

fn definition(id: &str, parts: Vec<PartDefinition>, total_ms: Option<u64>) -> AssessmentDefinition {
    AssessmentDefinition::new(AssessmentDraft {
        id: AssessmentId::new(id).unwrap(),
        title: format!("Test {id}"),
        kind: AssessmentKind::Writing,
        parts,
        total_duration_ms: total_ms,
    })
    .unwrap()
}

/// Three parts of 8, 20 and 32 minutes.
fn three_part_writing() -> AssessmentDefinition {
    definition(
        "X",
        vec![
            writing_part(1, 8, &["w1", "w2"]),
            writing_part(2, 20, &["w3", "w4"]),
            writing_part(3, 32, &["w5", "w6"]),
        ],
        None,
    )
}

/// Twenty minutes over two parts.
fn twenty_minute_writing() -> AssessmentDefinition {
    definition(
        "X",
        vec![
            writing_part(1, 8, &["w1", "w2"]),
            writing_part(2, 12, &["w3"]),
        ],
        None,
    )
}

struct Harness {
    repo: Arc<InMemoryRepository>,
    submitter: Arc<FakeSubmitter>,
}

impl Harness {
    fn new() -> Self {
        Self::with_submitter(FakeSubmitter::default())
    }

    fn with_submitter(submitter: FakeSubmitter) -> Self {
        Self {
            repo: Arc::new(InMemoryRepository::new()),
            submitter: Arc::new(submitter),
        }
    }

    fn deps_at(&self, now: DateTime<Utc>, settings: EngineSettings) -> SessionDeps {
        let clock = Clock::fixed(now);
        let repo: Arc<dyn RecoveryRepository> = self.repo.clone();
        SessionDeps {
            recovery: Arc::new(RecoveryStore::new(repo).with_clock(clock)),
            submitter: self.submitter.clone(),
            settings,
            clock,
        }
    }

    fn controller_at(
        &self,
        definition: AssessmentDefinition,
        mode: SessionMode,
        now: DateTime<Utc>,
    ) -> SessionController {
        SessionController::new(definition, mode, self.deps_at(now, EngineSettings::default()))
    }

    async fn started(&self, definition: AssessmentDefinition, mode: SessionMode) -> SessionController {
        let mut controller = self.controller_at(definition, mode, fixed_now());
        assert_eq!(controller.start().await.unwrap(), StartOutcome::Fresh);
        controller
    }

    async fn stored(&self, id: &str) -> bool {
        self.repo
            .get_snapshot(&AssessmentId::new(id).unwrap())
            .await
            .unwrap()
            .is_some()
    }
}

fn text(body: &str) -> AnswerPayload {
    AnswerPayload::Text(body.into())
}

//
// ─── TIMED PROGRESSION ─────────────────────────────────────────────────────────
//

#[tokio::test]
async fn part_one_locks_after_eight_minutes_without_user_action() {
    let harness = Harness::new();
    let mut controller = harness.started(three_part_writing(), SessionMode::Timed).await;
    assert_eq!(controller.status(), SessionStatus::Active);

    let early = controller.tick(minutes(8) - Duration::seconds(1));
    assert!(early.advanced.is_empty());
    assert_eq!(controller.current_part(), PartNumber::new(1));

    let outcome = controller.tick(minutes(8));
    assert_eq!(
        outcome.advanced,
        vec![PartAdvance {
            from: PartNumber::new(1),
            to: PartNumber::new(2),
        }]
    );
    assert!(controller.is_locked(PartNumber::new(1)));
    assert_eq!(controller.current_part(), PartNumber::new(2));
    assert!(outcome.persisted);
}

#[tokio::test]
async fn locked_part_rejects_answers_and_navigation_is_automatic() {
    let harness = Harness::new();
    let mut controller = harness.started(three_part_writing(), SessionMode::Timed).await;
    controller.tick(minutes(8));

    let err = controller.set_answer(&qid("w1"), text("late")).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Rejected(TransitionRejected::Ledger(LedgerError::PartLocked { .. }))
    ));
    assert!(controller.ledger().question(&qid("w1")).unwrap().answer.is_none());

    let err = controller.go_to(PartNumber::new(1)).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Rejected(TransitionRejected::Navigation(
            NavigationError::ManualNavigationDisabled
        ))
    ));
    assert_eq!(controller.current_part(), PartNumber::new(2));
}

#[tokio::test]
async fn timed_mode_refuses_questions_outside_the_current_part() {
    let harness = Harness::new();
    let mut controller = harness.started(three_part_writing(), SessionMode::Timed).await;
    let before = controller.ledger().clone();

    let err = controller.set_answer(&qid("w5"), text("skipping ahead")).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Rejected(TransitionRejected::Navigation(
            NavigationError::NotCurrentPart { .. }
        ))
    ));
    assert!(controller.begin_question(&qid("w6")).is_err());
    assert!(controller.mark_phase(&qid("w3"), QuestionPhase::Capturing).is_err());
    assert!(controller.re_record(&qid("w4")).is_err());
    assert_eq!(controller.ledger(), &before);
    assert_eq!(controller.current_part(), PartNumber::new(1));

    controller.tick(minutes(28));
    assert_eq!(controller.current_part(), PartNumber::new(3));
    controller.set_answer(&qid("w5"), text("on time")).unwrap();
}

#[tokio::test]
async fn delayed_tick_advances_each_expired_part_once_in_order() {
    let harness = Harness::new();
    let mut controller = harness.started(three_part_writing(), SessionMode::Timed).await;

    let outcome = controller.tick(minutes(30));
    assert_eq!(
        outcome.advanced,
        vec![
            PartAdvance {
                from: PartNumber::new(1),
                to: PartNumber::new(2),
            },
            PartAdvance {
                from: PartNumber::new(2),
                to: PartNumber::new(3),
            },
        ]
    );
    assert_eq!(outcome.remaining_ms, 1_800_000);
    assert!(controller.tick(minutes(31)).advanced.is_empty());
    assert_eq!(controller.current_part(), PartNumber::new(3));
}

#[tokio::test]
async fn remaining_time_never_increases_or_goes_negative() {
    let harness = Harness::new();
    let mut controller = harness.started(twenty_minute_writing(), SessionMode::Timed).await;

    let mut last = u64::MAX;
    for offset in [1, 3, 2, 7, 7, 19, 4, 25, 30] {
        let remaining = controller.tick(minutes(offset)).remaining_ms;
        assert!(remaining <= last);
        last = remaining;
    }
    assert_eq!(last, 0);
}

#[tokio::test]
async fn global_deadline_expires_and_forces_submission() {
    let harness = Harness::new();
    let mut controller = harness.started(three_part_writing(), SessionMode::Timed).await;
    controller.set_answer(&qid("w1"), text("first answer")).unwrap();

    let outcome = controller.tick(minutes(61));
    assert!(outcome.expired);
    assert!(outcome.submit_due);
    assert_eq!(outcome.remaining_ms, 0);
    assert_eq!(controller.status(), SessionStatus::Expired);
    assert!(controller.is_locked(PartNumber::new(3)));
    assert!(matches!(
        controller.set_answer(&qid("w5"), text("too late")),
        Err(SessionError::NotActive)
    ));

    let receipt = controller.submit().await.unwrap();
    assert_eq!(receipt.result_id, "result-X");
    assert_eq!(controller.status(), SessionStatus::Completed);
    assert!(!harness.stored("X").await);

    let calls = harness.submitter.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].duration_ms, 3_600_000);
    assert_eq!(calls[0].answers.len(), 6);
    assert_eq!(calls[0].answers[0].payload, Some(text("first answer")));
    assert_eq!(
        controller.ledger().question(&qid("w1")).unwrap().phase,
        QuestionPhase::Submitted
    );
}

#[tokio::test]
async fn final_part_expiry_waits_for_capture_in_progress() {
    let harness = Harness::new();
    let def = definition(
        "S",
        vec![writing_part(1, 1, &["s1"]), writing_part(2, 1, &["s2"])],
        Some(600_000),
    );
    let mut controller = harness.started(def, SessionMode::Timed).await;

    controller.tick(minutes(1));
    assert_eq!(controller.current_part(), PartNumber::new(2));
    assert_eq!(
        controller.begin_question(&qid("s2")).unwrap(),
        QuestionPhase::Capturing
    );

    let waiting = controller.tick(minutes(2));
    assert!(!waiting.submit_due);
    assert!(!controller.is_locked(PartNumber::new(2)));

    controller.set_answer(&qid("s2"), text("done")).unwrap();
    let closed = controller.tick(minutes(2) + Duration::seconds(1));
    assert!(closed.submit_due);
    assert!(!closed.expired);
    assert!(controller.is_locked(PartNumber::new(2)));
    assert_eq!(controller.status(), SessionStatus::Active);
}

#[tokio::test]
async fn speaking_question_windows_follow_the_wall_clock() {
    let harness = Harness::new();
    let def = AssessmentDefinition::new(AssessmentDraft {
        id: AssessmentId::new("speaking-1").unwrap(),
        title: "Speaking Test 1".into(),
        kind: AssessmentKind::Speaking,
        parts: vec![PartDefinition {
            part_number: PartNumber::new(1),
            time_limit_ms: 600_000,
            questions: vec![QuestionDefinition::timed(qid("sp1"), 30_000, 45_000)],
        }],
        total_duration_ms: None,
    })
    .unwrap();
    let mut controller = harness.started(def, SessionMode::Timed).await;

    assert_eq!(
        controller.begin_question(&qid("sp1")).unwrap(),
        QuestionPhase::Preparing
    );
    let start = controller.tick(fixed_now() + Duration::seconds(30));
    assert_eq!(
        start.question_events,
        vec![QuestionTimerEvent::CaptureStarted(qid("sp1"))]
    );
    let closed = controller.tick(fixed_now() + Duration::seconds(75));
    assert_eq!(
        closed.question_events,
        vec![QuestionTimerEvent::CaptureWindowClosed(qid("sp1"))]
    );

    let media = AnswerPayload::Media(MediaRef {
        uri: "blob:recording-1".into(),
        duration_ms: 44_000,
    });
    controller.set_answer(&qid("sp1"), media).unwrap();
    let record = controller.ledger().question(&qid("sp1")).unwrap();
    assert_eq!(record.phase, QuestionPhase::Answered);
    assert_eq!(record.metrics.capture_duration_ms, 44_000);

    controller.re_record(&qid("sp1")).unwrap();
    let record = controller.ledger().question(&qid("sp1")).unwrap();
    assert_eq!(record.phase, QuestionPhase::Capturing);
    assert!(record.answer.is_none());
}

#[tokio::test]
async fn phase_regression_is_rejected_without_changes() {
    let harness = Harness::new();
    let mut controller = harness.started(three_part_writing(), SessionMode::Timed).await;
    controller.set_answer(&qid("w2"), text("answer")).unwrap();
    let before = controller.ledger().clone();

    let err = controller
        .mark_phase(&qid("w2"), QuestionPhase::Preparing)
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Rejected(TransitionRejected::Ledger(
            LedgerError::InvalidTransition { .. }
        ))
    ));
    assert_eq!(controller.ledger(), &before);
}

//
// ─── PRACTICE MODE ─────────────────────────────────────────────────────────────
//

#[tokio::test]
async fn practice_mode_navigates_freely_and_only_notifies_on_budget_end() {
    let harness = Harness::new();
    let def = definition(
        "P",
        vec![writing_part(1, 8, &["p1"]), writing_part(2, 8, &["p2"])],
        Some(2_000),
    );
    let mut controller = harness.started(def, SessionMode::Practice).await;

    assert_eq!(controller.go_to(PartNumber::new(2)).unwrap(), PartNumber::new(2));
    assert_eq!(controller.go_to(PartNumber::new(1)).unwrap(), PartNumber::new(1));

    let first = controller.tick(minutes(60));
    assert_eq!(first.remaining_ms, 1_000);
    assert!(first.advanced.is_empty());
    let second = controller.tick(minutes(60));
    assert!(second.budget_exhausted);
    assert!(!second.expired);
    assert!(!second.submit_due);
    let third = controller.tick(minutes(61));
    assert!(!third.budget_exhausted);

    assert_eq!(controller.status(), SessionStatus::Active);
    assert!(!controller.is_locked(PartNumber::new(1)));
    controller.set_answer(&qid("p1"), text("still allowed")).unwrap();
}

//
// ─── RECOVERY ──────────────────────────────────────────────────────────────────
//

#[tokio::test]
async fn reopened_session_derives_remaining_time_from_deadline() {
    let harness = Harness::new();
    let mut first = harness.started(twenty_minute_writing(), SessionMode::Timed).await;
    first.set_answer(&qid("w1"), text("draft")).unwrap();
    assert!(first.tick(minutes(5)).persisted);
    first.flush_persistence().await;
    drop(first);

    let mut reopened = harness.controller_at(twenty_minute_writing(), SessionMode::Timed, minutes(7));
    let StartOutcome::RecoveryAvailable(prompt) = reopened.start().await.unwrap() else {
        panic!("expected a recovery prompt");
    };
    assert_eq!(prompt.test_title, "Test X");
    assert_eq!(prompt.time_remaining_ms, 780_000);
    assert_eq!(prompt.answered_count, 1);
    assert_eq!(prompt.total_count, 3);
    assert_eq!(prompt.progress_percent, 33);
    assert_eq!(reopened.status(), SessionStatus::NotStarted);

    let RecoveryResolution::Resumed(outcome) = reopened
        .resolve_recovery(RecoveryChoice::Continue)
        .await
        .unwrap()
    else {
        panic!("expected resume");
    };
    assert_eq!(outcome.remaining_ms, 780_000);
    assert_eq!(reopened.remaining_ms(), 780_000);
    assert_eq!(reopened.status(), SessionStatus::Active);
    assert_eq!(
        reopened.ledger().question(&qid("w1")).unwrap().answer,
        Some(text("draft"))
    );
}

#[tokio::test]
async fn restore_catches_up_parts_that_expired_while_closed() {
    let harness = Harness::new();
    let mut first = harness.started(twenty_minute_writing(), SessionMode::Timed).await;
    first.tick(minutes(5));
    first.flush_persistence().await;
    drop(first);

    let mut reopened = harness.controller_at(twenty_minute_writing(), SessionMode::Timed, minutes(9));
    reopened.start().await.unwrap();
    let RecoveryResolution::Resumed(outcome) = reopened
        .resolve_recovery(RecoveryChoice::Continue)
        .await
        .unwrap()
    else {
        panic!("expected resume");
    };
    assert_eq!(
        outcome.advanced,
        vec![PartAdvance {
            from: PartNumber::new(1),
            to: PartNumber::new(2),
        }]
    );
    assert_eq!(outcome.remaining_ms, 660_000);
    assert!(reopened.is_locked(PartNumber::new(1)));
}

#[tokio::test]
async fn restore_reproduces_ledger_by_value() {
    let harness = Harness::new();
    let mut first = harness.started(three_part_writing(), SessionMode::Timed).await;
    first.set_answer(&qid("w1"), text("one two three")).unwrap();
    first.mark_phase(&qid("w2"), QuestionPhase::Capturing).unwrap();
    first.tick(minutes(2));
    let snapshot = first.snapshot(minutes(2));
    let expected = first.ledger().clone();

    let mut second = harness.controller_at(three_part_writing(), SessionMode::Timed, minutes(2));
    second.restore(snapshot).unwrap();
    assert_eq!(second.ledger(), &expected);
    assert_eq!(second.current_part(), PartNumber::new(1));
    assert_eq!(second.session().attempt_id(), first.session().attempt_id());
}

#[tokio::test]
async fn snapshot_mode_wins_on_restore() {
    let harness = Harness::new();
    let first = harness.started(three_part_writing(), SessionMode::Practice).await;
    let snapshot = first.snapshot(fixed_now());

    let mut second = harness.controller_at(three_part_writing(), SessionMode::Timed, fixed_now());
    second.restore(snapshot).unwrap();
    assert_eq!(second.mode(), SessionMode::Practice);
    assert!(second.go_to(PartNumber::new(3)).is_ok());
}

#[tokio::test]
async fn snapshot_for_another_assessment_is_not_offered() {
    let harness = Harness::new();
    let x = harness.started(twenty_minute_writing(), SessionMode::Timed).await;
    x.flush_persistence().await;

    let other = definition("Y", vec![writing_part(1, 10, &["y1"])], None);
    let mut y = harness.controller_at(other.clone(), SessionMode::Timed, minutes(1));
    assert_eq!(y.start().await.unwrap(), StartOutcome::Fresh);
    assert!(harness.stored("X").await);

    let mut unstarted = harness.controller_at(other, SessionMode::Timed, minutes(1));
    let err = unstarted.restore(x.snapshot(minutes(1))).unwrap_err();
    assert!(matches!(err, SessionError::StaleSnapshot));
    assert!(matches!(
        y.restore(x.snapshot(minutes(1))),
        Err(SessionError::AlreadyStarted)
    ));
}

#[tokio::test]
async fn expired_snapshot_is_discarded_and_session_starts_fresh() {
    let harness = Harness::new();
    let first = harness.started(twenty_minute_writing(), SessionMode::Timed).await;
    let old_attempt = first.session().attempt_id();
    first.flush_persistence().await;
    drop(first);

    let mut late = harness.controller_at(twenty_minute_writing(), SessionMode::Timed, minutes(21));
    assert_eq!(late.start().await.unwrap(), StartOutcome::Fresh);
    assert_ne!(late.session().attempt_id(), old_attempt);
    assert_eq!(late.remaining_ms(), 1_200_000);

    let stale = late.snapshot(minutes(21));
    let mut other = harness.controller_at(twenty_minute_writing(), SessionMode::Timed, minutes(45));
    assert!(matches!(other.restore(stale), Err(SessionError::StaleSnapshot)));
}

#[tokio::test]
async fn restart_clears_store_and_cancel_keeps_it() {
    let harness = Harness::new();
    let mut first = harness.started(twenty_minute_writing(), SessionMode::Timed).await;
    first.set_answer(&qid("w1"), text("keep me?")).unwrap();
    first.flush_persistence().await;
    drop(first);

    let mut reopened = harness.controller_at(twenty_minute_writing(), SessionMode::Timed, minutes(3));
    reopened.start().await.unwrap();
    assert_eq!(
        reopened.resolve_recovery(RecoveryChoice::Cancel).await.unwrap(),
        RecoveryResolution::Cancelled
    );
    assert_eq!(reopened.status(), SessionStatus::NotStarted);
    assert!(reopened.pending_recovery().is_some());
    assert!(harness.stored("X").await);

    assert_eq!(
        reopened.resolve_recovery(RecoveryChoice::Restart).await.unwrap(),
        RecoveryResolution::Restarted
    );
    assert_eq!(reopened.status(), SessionStatus::Active);
    assert!(reopened.ledger().question(&qid("w1")).unwrap().answer.is_none());
    assert!(matches!(
        reopened.resolve_recovery(RecoveryChoice::Continue).await,
        Err(SessionError::NoPendingRecovery)
    ));
}

//
// ─── SUBMISSION ────────────────────────────────────────────────────────────────
//

#[tokio::test]
async fn failed_submission_keeps_session_active_and_store_entry() {
    let harness = Harness::with_submitter(FakeSubmitter::failing());
    let mut controller = harness.started(twenty_minute_writing(), SessionMode::Timed).await;
    controller.set_answer(&qid("w1"), text("answer")).unwrap();

    let err = controller.submit().await.unwrap_err();
    assert!(matches!(err, SessionError::Submission(_)));
    assert_eq!(controller.status(), SessionStatus::Active);
    assert!(!controller.is_submission_in_flight());
    controller.flush_persistence().await;
    assert!(harness.stored("X").await);

    harness.submitter.fail.store(false, Ordering::SeqCst);
    controller.submit().await.unwrap();
    assert_eq!(controller.status(), SessionStatus::Completed);
    assert!(!harness.stored("X").await);
    assert_eq!(harness.submitter.calls().len(), 2);
}

#[tokio::test]
async fn failed_forced_submission_is_due_again_after_reopening() {
    let harness = Harness::with_submitter(FakeSubmitter::failing());
    let def = || {
        definition(
            "S",
            vec![writing_part(1, 1, &["s1"]), writing_part(2, 1, &["s2"])],
            Some(600_000),
        )
    };
    let mut first = harness.started(def(), SessionMode::Timed).await;
    assert!(first.tick(minutes(2)).submit_due);
    assert!(first.submit().await.is_err());
    first.flush_persistence().await;
    drop(first);

    let mut reopened = harness.controller_at(def(), SessionMode::Timed, minutes(3));
    reopened.start().await.unwrap();
    let RecoveryResolution::Resumed(outcome) = reopened
        .resolve_recovery(RecoveryChoice::Continue)
        .await
        .unwrap()
    else {
        panic!("expected resume");
    };
    assert!(outcome.submit_due);
    assert_eq!(reopened.status(), SessionStatus::Active);
    assert!(reopened.is_locked(PartNumber::new(2)));
    assert!(reopened.is_submit_due());

    harness.submitter.fail.store(false, Ordering::SeqCst);
    reopened.submit().await.unwrap();
    assert_eq!(reopened.status(), SessionStatus::Completed);
    assert!(!harness.stored("S").await);
}

#[tokio::test]
async fn in_flight_guard_prevents_double_submission() {
    let harness = Harness::new();
    let mut controller = harness.started(twenty_minute_writing(), SessionMode::Timed).await;
    controller.set_answer(&qid("w2"), text("answer")).unwrap();

    let ticket = controller.begin_submission().unwrap();
    assert_eq!(ticket.payload().answers, controller.ledger().drain());
    assert_eq!(controller.ledger().drain(), controller.ledger().drain());

    assert!(matches!(
        controller.begin_submission(),
        Err(SessionError::SubmissionInFlight)
    ));
    assert!(controller.tick(minutes(10)).suspended);
    assert!(matches!(
        controller.set_answer(&qid("w1"), text("blocked")),
        Err(SessionError::SubmissionInFlight)
    ));

    let receipt = SubmissionReceipt {
        result_id: "r-1".into(),
        summary: Some(serde_json::json!({ "score": 160 })),
    };
    controller.complete_submission(Ok(receipt)).await.unwrap();
    assert_eq!(controller.status(), SessionStatus::Completed);
    assert_eq!(controller.receipt().unwrap().result_id, "r-1");
    assert!(matches!(
        controller.begin_submission(),
        Err(SessionError::NotActive)
    ));
}

#[tokio::test]
async fn calls_before_start_are_refused() {
    let harness = Harness::new();
    let mut controller = harness.controller_at(twenty_minute_writing(), SessionMode::Timed, fixed_now());
    assert!(matches!(
        controller.set_answer(&qid("w1"), text("early")),
        Err(SessionError::NotStarted)
    ));
    assert!(controller.tick(minutes(1)).suspended);
    assert!(matches!(
        controller.begin_submission(),
        Err(SessionError::NotStarted)
    ));

    controller.start().await.unwrap();
    assert!(matches!(
        controller.start().await,
        Err(SessionError::AlreadyStarted)
    ));
}

//
// ─── RUNNER ────────────────────────────────────────────────────────────────────
//

fn fast_settings() -> EngineSettings {
    EngineSettingsDraft {
        tick_interval_ms: Some(100),
        ..EngineSettingsDraft::default()
    }
    .validate()
    .unwrap()
}

#[tokio::test]
async fn runner_applies_commands_and_submits() {
    let harness = Harness::new();
    let mut controller = SessionController::new(
        twenty_minute_writing(),
        SessionMode::Timed,
        harness.deps_at(fixed_now(), fast_settings()),
    );
    controller.start().await.unwrap();

    let (runner, commands, mut events) = SessionRunner::new(controller, 16);
    let task = tokio::spawn(runner.run(std::time::Duration::from_millis(100)));

    commands
        .send(SessionCommand::Answer {
            question: qid("w1"),
            payload: text("from the runner"),
        })
        .await
        .unwrap();
    commands.send(SessionCommand::GoTo(PartNumber::new(2))).await.unwrap();
    commands.send(SessionCommand::Submit).await.unwrap();

    let mut accepted = 0;
    let mut rejected = 0;
    let receipt = loop {
        match events.recv().await.expect("runner event") {
            SessionEvent::Accepted(_) => accepted += 1,
            SessionEvent::Rejected { .. } => rejected += 1,
            SessionEvent::Submitted(receipt) => break receipt,
            SessionEvent::SubmissionFailed(reason) => panic!("submission failed: {reason}"),
            _ => {}
        }
    };
    assert_eq!(receipt.result_id, "result-X");
    assert_eq!(accepted, 1);
    assert_eq!(rejected, 1);

    let controller = task.await.unwrap();
    assert_eq!(controller.status(), SessionStatus::Completed);
    assert!(!harness.stored("X").await);
}

#[tokio::test]
async fn leaving_stops_the_runner_and_saves_once() {
    let harness = Harness::new();
    let mut controller = SessionController::new(
        twenty_minute_writing(),
        SessionMode::Timed,
        harness.deps_at(fixed_now(), fast_settings()),
    );
    controller.start().await.unwrap();
    controller.flush_persistence().await;
    harness
        .repo
        .delete_snapshot(&AssessmentId::new("X").unwrap())
        .await
        .unwrap();

    let (runner, commands, mut events) = SessionRunner::new(controller, 16);
    let task = tokio::spawn(runner.run(std::time::Duration::from_millis(100)));
    commands.send(SessionCommand::Leave).await.unwrap();

    loop {
        if events.recv().await.expect("runner event") == SessionEvent::Left {
            break;
        }
    }
    let mut controller = task.await.unwrap();
    assert_eq!(controller.status(), SessionStatus::Active);
    assert!(controller.tick(minutes(1)).suspended);
    assert!(harness.stored("X").await);
}
