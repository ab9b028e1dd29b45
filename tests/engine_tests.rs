use std::collections::BTreeMap;

use mathtrainer_engine::config::EngineConfig;
use mathtrainer_engine::engine::snapshot::{ProfileDocument, DOCUMENT_VERSION};
use mathtrainer_engine::engine::stats::{StatsReport, StatsView};
use mathtrainer_engine::engine::trend::Prediction;
use mathtrainer_engine::engine::types::{
    Operation, Session, SessionMode, SessionSummary, SkillRecord, UserProfile,
};
use mathtrainer_engine::engine::{PracticeEngine, SessionParams};
use mathtrainer_engine::error::EngineError;

fn engine() -> PracticeEngine {
    PracticeEngine::with_seed(EngineConfig::default(), 99)
}

fn skill(ema_accuracy: f64, ema_rt: f64) -> SkillRecord {
    SkillRecord {
        ema_accuracy,
        ema_response_time_ms: ema_rt,
        attempt_count: 10,
        recent_mistake_count: 0,
        tier: 0,
    }
}

fn document(profile: UserProfile, skills: BTreeMap<Operation, SkillRecord>) -> ProfileDocument {
    ProfileDocument {
        version: DOCUMENT_VERSION,
        profile,
        skill_records: skills,
        ..Default::default()
    }
}

fn closed_session(accuracy: f64, avg_time_ms: f64) -> Session {
    Session {
        id: uuid::Uuid::new_v4().to_string(),
        mode: SessionMode::Normal,
        start_time: 1_000,
        end_time: Some(2_000),
        attempts: vec![],
        summary: Some(SessionSummary {
            accuracy,
            avg_time_ms,
        }),
    }
}

fn answer_next_correctly(engine: &PracticeEngine, rt_ms: i64) -> i64 {
    let question = engine.next_question().unwrap();
    engine
        .submit_answer_timed(question.correct_answer, rt_ms)
        .unwrap()
        .xp_awarded
}

#[test]
fn fast_addition_answer_awards_twelve_xp() {
    let engine = engine();
    let mut skills = BTreeMap::new();
    skills.insert(Operation::Add, skill(0.8, 2500.0));
    let profile = UserProfile {
        level: 3,
        xp: 80,
        xp_to_next: 100,
        initial_assessment_score: None,
    };
    engine.restore(document(profile, skills)).unwrap();

    engine
        .start_session(
            SessionMode::PracticeTargeted,
            SessionParams {
                operations: Some(vec![Operation::Add]),
            },
        )
        .unwrap();
    let question = engine.next_question().unwrap();
    let outcome = engine
        .submit_answer_timed(question.correct_answer, 1800)
        .unwrap();

    assert!(outcome.correct);
    assert_eq!(outcome.xp_awarded, 12);
    assert!(!outcome.leveled_up);
    let profile = engine.profile();
    assert_eq!(profile.level, 3);
    assert_eq!(profile.xp, 92);
}

#[test]
fn crossing_the_threshold_levels_up_with_leftover_xp() {
    let engine = engine();
    let mut skills = BTreeMap::new();
    skills.insert(Operation::Add, skill(0.8, 2500.0));
    let profile = UserProfile {
        level: 3,
        xp: 95,
        xp_to_next: 100,
        initial_assessment_score: None,
    };
    engine.restore(document(profile, skills)).unwrap();

    engine
        .start_session(
            SessionMode::PracticeTargeted,
            SessionParams {
                operations: Some(vec![Operation::Add]),
            },
        )
        .unwrap();
    let question = engine.next_question().unwrap();
    let outcome = engine
        .submit_answer_timed(question.correct_answer, 1800)
        .unwrap();

    assert_eq!(outcome.xp_awarded, 12);
    assert!(outcome.leveled_up);
    assert_eq!(outcome.new_level, 4);
    let profile = engine.profile();
    assert_eq!(profile.level, 4);
    assert_eq!(profile.xp, 7);
    assert!(profile.xp < profile.xp_to_next);
}

#[test]
fn wrong_answers_award_no_xp_but_count_as_attempts() {
    let engine = engine();
    engine
        .start_session(SessionMode::Normal, SessionParams::default())
        .unwrap();
    let question = engine.next_question().unwrap();
    let outcome = engine
        .submit_answer_timed(question.correct_answer + 1.0, 2000)
        .unwrap();
    assert!(!outcome.correct);
    assert_eq!(outcome.xp_awarded, 0);
    assert_eq!(engine.profile().xp, 0);

    let summary = engine.end_session().unwrap();
    assert_eq!(summary.accuracy, 0.0);
    match engine.get_stats(StatsView::Overview) {
        StatsReport::Overview(overview) => {
            assert_eq!(overview.attempts, 1);
            assert_eq!(overview.correct, 0);
            assert_eq!(overview.sessions, 1);
        }
        other => panic!("unexpected report {:?}", other),
    }
}

#[test]
fn sustained_fast_streak_raises_the_tier() {
    let engine = engine();
    engine
        .start_session(
            SessionMode::PracticeTargeted,
            SessionParams {
                operations: Some(vec![Operation::Multiply]),
            },
        )
        .unwrap();
    let before = engine.skill(Operation::Multiply);
    for _ in 0..10 {
        answer_next_correctly(&engine, 800);
    }
    let after = engine.skill(Operation::Multiply);
    assert!(after.ema_accuracy > before.ema_accuracy);
    assert!(after.ema_response_time_ms < before.ema_response_time_ms);
    assert!(after.tier >= before.tier);
    assert_eq!(after.attempt_count, before.attempt_count + 10);
}

#[test]
fn practice_queue_is_finite_and_exhaustion_is_reported() {
    let engine = engine();
    let start = engine
        .start_session(SessionMode::PracticeTargeted, SessionParams::default())
        .unwrap();
    assert_eq!(start.queue_len, 10);
    assert!(!start.degraded);
    for _ in 0..start.queue_len {
        answer_next_correctly(&engine, 1500);
    }
    assert!(matches!(
        engine.next_question(),
        Err(EngineError::QueueExhausted)
    ));
    engine.end_session().unwrap();
}

#[test]
fn mistake_practice_without_history_degrades_to_targeted() {
    let engine = engine();
    let start = engine
        .start_session(SessionMode::PracticeMistakes, SessionParams::default())
        .unwrap();
    assert!(start.degraded);
    assert_eq!(start.queue_len, 10);
}

#[test]
fn mistake_practice_draws_from_recorded_failures() {
    let engine = engine();

    // A session full of division mistakes.
    engine
        .start_session(
            SessionMode::PracticeTargeted,
            SessionParams {
                operations: Some(vec![Operation::Divide]),
            },
        )
        .unwrap();
    for _ in 0..10 {
        let question = engine.next_question().unwrap();
        engine
            .submit_answer_timed(question.correct_answer + 3.0, 4000)
            .unwrap();
    }
    engine.end_session().unwrap();

    let start = engine
        .start_session(SessionMode::PracticeMistakes, SessionParams::default())
        .unwrap();
    assert!(!start.degraded);
    for _ in 0..start.queue_len {
        let question = engine.next_question().unwrap();
        assert_eq!(question.operation, Operation::Divide);
        engine
            .submit_answer_timed(question.correct_answer, 1500)
            .unwrap();
    }
    engine.end_session().unwrap();
}

#[test]
fn slow_practice_targets_operations_answered_sluggishly() {
    let engine = engine();

    // Subtraction dragged well past the pace bar while addition stayed quick.
    engine
        .start_session(
            SessionMode::PracticeTargeted,
            SessionParams {
                operations: Some(vec![Operation::Subtract, Operation::Add]),
            },
        )
        .unwrap();
    for _ in 0..10 {
        let question = engine.next_question().unwrap();
        let rt = if question.operation == Operation::Subtract {
            9000
        } else {
            800
        };
        engine.submit_answer_timed(question.correct_answer, rt).unwrap();
    }
    engine.end_session().unwrap();

    let start = engine
        .start_session(SessionMode::PracticeSlow, SessionParams::default())
        .unwrap();
    assert!(!start.degraded);
    for _ in 0..start.queue_len {
        let question = engine.next_question().unwrap();
        assert_eq!(question.operation, Operation::Subtract);
        engine
            .submit_answer_timed(question.correct_answer, 1000)
            .unwrap();
    }
    engine.end_session().unwrap();
}

#[test]
fn session_lifecycle_errors_are_explicit() {
    let engine = engine();
    assert!(matches!(
        engine.next_question(),
        Err(EngineError::NoActiveSession)
    ));
    assert!(matches!(
        engine.end_session(),
        Err(EngineError::NoActiveSession)
    ));

    engine
        .start_session(SessionMode::Normal, SessionParams::default())
        .unwrap();
    assert!(matches!(
        engine.submit_answer_timed(1.0, 100),
        Err(EngineError::NoPendingQuestion)
    ));
    assert!(matches!(
        engine.start_session(SessionMode::Normal, SessionParams::default()),
        Err(EngineError::SessionActive)
    ));
    assert!(matches!(
        engine.submit_answer_timed(1.0, 0),
        Err(EngineError::Validation(_))
    ));
}

#[test]
fn pending_question_is_redelivered_until_answered() {
    let engine = engine();
    engine
        .start_session(SessionMode::Normal, SessionParams::default())
        .unwrap();
    let first = engine.next_question().unwrap();
    let second = engine.next_question().unwrap();
    assert_eq!(first.id, second.id);
    engine
        .submit_answer_timed(first.correct_answer, 1000)
        .unwrap();
    let third = engine.next_question().unwrap();
    assert_ne!(first.id, third.id);
}

#[test]
fn untimed_answers_measure_from_question_delivery() {
    let engine = engine();
    // Practice queues are generated in full up front; the clock for an
    // untimed answer must start when the question is handed out.
    engine
        .start_session(
            SessionMode::PracticeTargeted,
            SessionParams {
                operations: Some(vec![Operation::Add]),
            },
        )
        .unwrap();

    let first = engine.next_question().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(250));
    let slow = engine.submit_answer(first.correct_answer).unwrap();
    assert!(slow.response_time_ms >= 250);

    let second = engine.next_question().unwrap();
    let quick = engine.submit_answer(second.correct_answer).unwrap();
    assert!(
        quick.response_time_ms < 200,
        "instant answer charged {}ms",
        quick.response_time_ms
    );
}

#[test]
fn linear_accuracy_history_projects_to_076() {
    let engine = engine();
    let mut doc = ProfileDocument::default();
    doc.sessions = vec![
        closed_session(0.70, 2000.0),
        closed_session(0.72, 2000.0),
        closed_session(0.74, 2000.0),
    ];
    engine.restore(doc).unwrap();

    match engine.get_prediction(None) {
        Prediction::Projection(projection) => {
            let accuracy = projection.accuracy.unwrap();
            assert!((accuracy.next - 0.76).abs() < 1e-9);
            assert!(projection.speculative);
        }
        other => panic!("expected projection, got {:?}", other),
    }
}

#[test]
fn predictions_refuse_to_guess_from_one_session() {
    let engine = engine();
    let mut doc = ProfileDocument::default();
    doc.sessions = vec![closed_session(0.9, 1200.0)];
    engine.restore(doc).unwrap();
    assert_eq!(
        engine.get_prediction(None),
        Prediction::InsufficientData { sessions: 1 }
    );
}

#[test]
fn snapshot_mid_session_conserves_attempts() {
    let engine = engine();
    engine
        .start_session(SessionMode::Normal, SessionParams::default())
        .unwrap();
    for _ in 0..3 {
        answer_next_correctly(&engine, 1200);
    }

    let snapshot = engine.snapshot();
    let total: usize = snapshot.sessions.iter().map(|s| s.attempts.len()).sum();
    assert_eq!(total, 3);

    let replica = PracticeEngine::with_seed(EngineConfig::default(), 1);
    replica.restore(snapshot).unwrap();
    assert!(replica.session_active());
    let replayed = replica.snapshot();
    let replayed_total: usize = replayed.sessions.iter().map(|s| s.attempts.len()).sum();
    assert_eq!(replayed_total, 3);
    // The replica can keep playing the resumed session.
    let question = replica.next_question().unwrap();
    replica
        .submit_answer_timed(question.correct_answer, 900)
        .unwrap();
    replica.end_session().unwrap();
}

#[test]
fn restore_recomputes_tiers_and_fills_missing_records() {
    let engine = engine();
    let mut skills = BTreeMap::new();
    // A tier claim inconsistent with the record itself.
    skills.insert(
        Operation::Percent,
        SkillRecord {
            ema_accuracy: 0.95,
            ema_response_time_ms: 1000.0,
            attempt_count: 50,
            recent_mistake_count: 0,
            tier: 0,
        },
    );
    engine
        .restore(document(UserProfile::default(), skills))
        .unwrap();
    assert_eq!(engine.skill(Operation::Percent).tier, 5);
    // Missing operations come back as neutral seeds.
    assert_eq!(engine.skill(Operation::Root).tier, 2);
}

#[test]
fn wipe_resets_everything_and_is_idempotent() {
    let engine = engine();
    engine
        .start_session(SessionMode::Normal, SessionParams::default())
        .unwrap();
    for _ in 0..5 {
        answer_next_correctly(&engine, 700);
    }
    engine.end_session().unwrap();
    assert!(engine.profile().xp > 0 || engine.profile().level > 1);

    engine.wipe_all_data();
    let wiped_once = engine.snapshot();
    engine.wipe_all_data();
    let wiped_twice = engine.snapshot();

    assert_eq!(wiped_once, wiped_twice);
    assert_eq!(wiped_once.profile, UserProfile::default());
    assert!(wiped_once.sessions.is_empty());
    assert!(!engine.session_active());
    match engine.get_stats(StatsView::Overview) {
        StatsReport::Overview(overview) => assert_eq!(overview.attempts, 0),
        other => panic!("unexpected report {:?}", other),
    }
}

#[test]
fn assessment_runs_once_and_seeds_skills() {
    let engine = engine();
    let questions = engine.request_assessment().unwrap();
    // Two questions per enabled operation; all seven are on by default.
    assert_eq!(questions.len(), 14);

    let answers: Vec<_> = questions
        .iter()
        .map(|q| mathtrainer_engine::engine::assessment::AssessmentAnswer {
            question_id: q.id.clone(),
            value: q.correct_answer,
            response_time_ms: 1200,
        })
        .collect();
    let score = engine.complete_assessment(&answers).unwrap();
    assert_eq!(score, 1.0);
    assert_eq!(engine.profile().initial_assessment_score, Some(1.0));
    assert!(engine.skill(Operation::Add).ema_accuracy > 0.5);

    assert!(matches!(
        engine.request_assessment(),
        Err(EngineError::AssessmentAlreadyDone)
    ));

    // The score survives a snapshot/restore cycle.
    let replica = PracticeEngine::with_seed(EngineConfig::default(), 5);
    replica.restore(engine.snapshot()).unwrap();
    assert_eq!(replica.profile().initial_assessment_score, Some(1.0));
    assert!(matches!(
        replica.request_assessment(),
        Err(EngineError::AssessmentAlreadyDone)
    ));
}

#[test]
fn newer_document_versions_are_rejected() {
    let engine = engine();
    let doc = ProfileDocument {
        version: DOCUMENT_VERSION + 1,
        ..Default::default()
    };
    assert!(matches!(
        engine.restore(doc),
        Err(EngineError::Validation(_))
    ));
}
