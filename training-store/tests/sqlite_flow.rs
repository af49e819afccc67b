//! Engine over the SQLite store
//!
//! Tests the full progression flow against an on-disk database:
//! - Catalog import and session playback
//! - Ledger uniqueness across repeated and concurrent completions
//! - Progress surviving a reopen of the database

use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;
use training_engine::{
    CertificateStatus, CertificateStore, CompletionResult, EngineConfig, EngineError,
    ProgressEngine, ProgressStore, RewardIssuer, RewardStatus, StepEvidence, TrainingProgress,
};
use training_store::{import_str, ProgressDb, SqliteStore};

const CATALOG: &str = r#"{
    "training": { "id": "safety", "title": "Workplace Safety", "xp_reward": 300,
                  "coins_reward": 30, "certificate_enabled": true },
    "modules": [
        { "id": "intro", "title": "Introduction", "position": 0, "xp_reward": 20,
          "coins_reward": 2, "duration_minutes": 5,
          "step": { "step_type": "video", "url": "https://cdn.example/intro.mp4" } },
        { "id": "hazards", "title": "Hazards", "position": 1, "xp_reward": 20,
          "coins_reward": 2, "duration_minutes": 10,
          "step": { "step_type": "text", "body": "Spot the hazard." } },
        { "id": "exam", "title": "Exam", "position": 2, "xp_reward": 50,
          "coins_reward": 5, "is_checkpoint": true, "min_score": 70,
          "step": { "step_type": "quiz", "questions": [
              { "prompt": "Exit sign colour?", "options": ["red", "green"], "correct_option": 1 },
              { "prompt": "Fire extinguisher class for oil?", "options": ["A", "B"], "correct_option": 1 }
          ] } },
        { "id": "wrapup", "title": "Wrap-up", "position": 3, "xp_reward": 10,
          "coins_reward": 1, "is_preview": true,
          "step": { "step_type": "reflection", "prompt": "What will you change?" } }
    ]
}"#;

const USER: &str = "alice";

fn open(dir: &TempDir) -> (SqliteStore, ProgressEngine) {
    let db = Arc::new(ProgressDb::open(&dir.path().join("progress.db")).unwrap());
    let store = SqliteStore::new(db);
    let engine = ProgressEngine::new(store.collaborators(), EngineConfig::default());
    (store, engine)
}

fn setup() -> (TempDir, SqliteStore, ProgressEngine) {
    let dir = TempDir::new().unwrap();
    let (store, engine) = open(&dir);
    import_str(store.db(), CATALOG).unwrap();
    (dir, store, engine)
}

#[tokio::test]
async fn test_full_training_on_sqlite() {
    let (_dir, store, engine) = setup();
    let mut session = engine.open_session(USER, "safety").await.unwrap();

    assert_eq!(session.current_module().unwrap().id, "intro");
    assert!(session.is_locked("hazards"));
    assert!(!session.is_locked("wrapup"));

    let intro = session
        .complete_current(CompletionResult::default().time_spent(300))
        .await
        .unwrap();
    assert_eq!(intro.newly_unlocked, vec!["hazards".to_string()]);
    assert_eq!(intro.outcome.percentage, 25);

    session.go_next().await.unwrap();
    let hazards = session
        .complete_current(CompletionResult::default())
        .await
        .unwrap();
    assert_eq!(hazards.next_module.as_deref(), Some("exam"));

    // One of two right: 50%, below the checkpoint
    session.go_next().await.unwrap();
    let failed = session
        .complete_current(
            CompletionResult::default().evidence(StepEvidence::QuizAnswers { answers: vec![1, 0] }),
        )
        .await
        .unwrap();
    assert!(!failed.outcome.accepted);
    assert_eq!(failed.outcome.rejection.as_ref().unwrap().score, Some(50));
    assert!(!session.progress().is_completed("exam"));

    let passed = session
        .complete_current(
            CompletionResult::default().evidence(StepEvidence::QuizAnswers { answers: vec![1, 1] }),
        )
        .await
        .unwrap();
    assert!(passed.outcome.accepted);
    assert_eq!(passed.outcome.score, Some(100));

    let done = session
        .complete_module(
            "wrapup",
            CompletionResult::default().evidence(StepEvidence::Reflection {
                text: "Keep exits clear".into(),
            }),
        )
        .await
        .unwrap();
    assert!(done.outcome.training_now_complete);
    assert!(done.next_module.is_none());
    assert!(done.outcome.training_reward.is_granted());
    let certificate = done.outcome.certificate.certificate().unwrap().clone();
    assert!(certificate.certificate_number.starts_with("CERT-"));

    let stats = store.db().stats().unwrap();
    assert_eq!(stats.grant_count, 5);
    assert_eq!(stats.certificate_count, 1);
    assert_eq!(stats.progress_count, 4);

    let summary = session.summary();
    assert!(summary.is_complete());
    assert_eq!(summary.xp_earned, 100);
    assert_eq!(summary.average_score, Some(100));

    assert_eq!(
        store.find(USER, "safety").await.unwrap(),
        Some(certificate)
    );
}

#[tokio::test]
async fn test_repeat_completion_keeps_single_grant() {
    let (_dir, store, engine) = setup();

    for _ in 0..3 {
        engine
            .complete_module(USER, "safety", "intro", CompletionResult::default())
            .await
            .unwrap();
    }

    assert_eq!(store.grants_for_user(USER).await.unwrap().len(), 1);
    let record = store.get_module_progress(USER, "intro").await.unwrap().unwrap();
    assert_eq!(record.attempts, 3);
}

#[tokio::test]
async fn test_concurrent_duplicate_submissions_grant_once() {
    let (_dir, store, engine) = setup();
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .complete_module(USER, "safety", "intro", CompletionResult::default())
                    .await
            })
        })
        .collect();

    let mut granted = 0;
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert!(outcome.accepted);
        match outcome.module_reward {
            RewardStatus::Granted { .. } => granted += 1,
            RewardStatus::AlreadyGranted => {}
            RewardStatus::NotApplicable => panic!("reward should apply"),
        }
    }

    assert_eq!(granted, 1);
    assert_eq!(store.grants_for_user(USER).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_progress_survives_reopen() {
    let (dir, _store, engine) = setup();
    engine
        .complete_module(USER, "safety", "intro", CompletionResult::default())
        .await
        .unwrap();
    drop(engine);

    let (store, engine) = open(&dir);
    let session = engine.open_session(USER, "safety").await.unwrap();
    assert_eq!(session.current_module().unwrap().id, "hazards");
    assert_eq!(session.training_progress().unwrap().percentage, 25);
    assert_eq!(store.grants_for_user(USER).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_locked_module_refused_on_sqlite() {
    let (_dir, store, engine) = setup();

    let err = engine
        .complete_module(USER, "safety", "exam", CompletionResult::with_score(90))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::ModuleLocked(_)));
    assert_eq!(store.db().stats().unwrap().progress_count, 0);
}

#[tokio::test]
async fn test_certificate_not_duplicated_after_recompletion() {
    let (_dir, store, engine) = setup();

    for id in ["intro", "hazards"] {
        engine
            .complete_module(USER, "safety", id, CompletionResult::default())
            .await
            .unwrap();
    }
    engine
        .complete_module(USER, "safety", "exam", CompletionResult::with_score(80))
        .await
        .unwrap();
    let first = engine
        .complete_module(USER, "safety", "wrapup", CompletionResult::default())
        .await
        .unwrap();
    assert!(matches!(first.certificate, CertificateStatus::Issued { .. }));

    let again = engine
        .complete_module(USER, "safety", "wrapup", CompletionResult::default())
        .await
        .unwrap();
    assert!(matches!(again.certificate, CertificateStatus::AlreadyIssued { .. }));
    assert_eq!(store.certificates_for_user(USER).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_late_lower_aggregate_does_not_lower_progress() {
    let (_dir, store, engine) = setup();
    for id in ["intro", "wrapup"] {
        engine
            .complete_module(USER, "safety", id, CompletionResult::default())
            .await
            .unwrap();
    }
    assert_eq!(
        store.get_training_progress(USER, "safety").await.unwrap().unwrap().percentage,
        50
    );

    // An overlapping completion that computed its aggregate earlier
    let mut late = TrainingProgress::new(USER, "safety", Utc::now());
    late.percentage = 25;
    store.upsert_training_progress(&late).await.unwrap();

    let stored = store.get_training_progress(USER, "safety").await.unwrap().unwrap();
    assert_eq!(stored.percentage, 50);

    let session = engine.open_session(USER, "safety").await.unwrap();
    assert_eq!(session.training_progress().unwrap().percentage, 50);
}
