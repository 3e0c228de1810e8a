use chrono::Duration;
use exam_core::model::{
    AnswerPayload, AssessmentDefinition, AssessmentDraft, AssessmentId, AssessmentKind,
    EngineSettingsDraft, PartDefinition, PartNumber, QuestionDefinition, QuestionId,
    RecoverySnapshot, Session, SessionMode, SessionStatus,
};
use exam_core::time::fixed_now;
use exam_core::{AnswerLedger, PartNavigator};
use storage::repository::{RecoveryRepository, SettingsRepository};
use storage::sqlite::SqliteRepository;

fn definition() -> AssessmentDefinition {
    AssessmentDefinition::new(AssessmentDraft {
        id: AssessmentId::new("writing-7").unwrap(),
        title: "Writing Test 7".into(),
        kind: AssessmentKind::Writing,
        parts: vec![
            PartDefinition {
                part_number: PartNumber::new(1),
                time_limit_ms: 480_000,
                questions: vec![
                    QuestionDefinition::untimed(QuestionId::new("w1").unwrap()),
                    QuestionDefinition::untimed(QuestionId::new("w2").unwrap()),
                ],
            },
            PartDefinition {
                part_number: PartNumber::new(2),
                time_limit_ms: 600_000,
                questions: vec![QuestionDefinition::untimed(QuestionId::new("w3").unwrap())],
            },
        ],
        total_duration_ms: None,
    })
    .unwrap()
}

fn snapshot_with_answer() -> RecoverySnapshot {
    let def = definition();
    let mut ledger = AnswerLedger::from_definition(&def);
    ledger
        .set_answer(
            &QuestionId::new("w1").unwrap(),
            AnswerPayload::Text("Dear Ms. Kim, thank you".into()),
        )
        .unwrap();
    let nav = PartNavigator::new(SessionMode::Timed, &ledger);
    let mut session = Session::new(
        def.id().clone(),
        SessionMode::Timed,
        def.total_duration_ms(),
        fixed_now(),
    );
    session.transition(SessionStatus::Active);
    RecoverySnapshot::capture(
        &session,
        def.title(),
        nav.current(),
        ledger.parts(),
        fixed_now() + Duration::minutes(2),
    )
}

#[tokio::test]
async fn sqlite_roundtrips_recovery_snapshot() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_recovery?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let snapshot = snapshot_with_answer();
    repo.put_snapshot(&snapshot).await.unwrap();

    let fetched = repo
        .get_snapshot(&snapshot.assessment_id)
        .await
        .unwrap()
        .expect("stored snapshot");
    assert_eq!(fetched, snapshot);

    let other = AssessmentId::new("speaking-1").unwrap();
    assert!(repo.get_snapshot(&other).await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_put_is_last_write_wins_and_delete_removes() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_recovery_lww?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    // Migrations are idempotent.
    repo.migrate().await.expect("second migrate");

    let mut snapshot = snapshot_with_answer();
    repo.put_snapshot(&snapshot).await.unwrap();
    snapshot.current_part = PartNumber::new(2);
    snapshot.captured_at += Duration::minutes(8);
    repo.put_snapshot(&snapshot).await.unwrap();

    let fetched = repo
        .get_snapshot(&snapshot.assessment_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.current_part, PartNumber::new(2));
    assert_eq!(fetched.captured_at, snapshot.captured_at);

    assert!(repo.delete_snapshot(&snapshot.assessment_id).await.unwrap());
    assert!(!repo.delete_snapshot(&snapshot.assessment_id).await.unwrap());
    assert!(
        repo.get_snapshot(&snapshot.assessment_id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn sqlite_persists_engine_settings() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_settings?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    assert!(repo.get_settings().await.unwrap().is_none());

    let settings = EngineSettingsDraft {
        autosave_interval_secs: Some(15),
        submission_base_url: Some("https://grading.example.com/api".into()),
        ..EngineSettingsDraft::default()
    }
    .validate()
    .unwrap();
    repo.save_settings(&settings).await.unwrap();

    let fetched = repo.get_settings().await.unwrap().unwrap();
    assert_eq!(fetched, settings);
}
