pub mod assessment;
pub mod generator;
pub mod progression;
pub mod selector;
pub mod skill;
pub mod snapshot;
pub mod stats;
pub mod trend;
pub mod types;

use std::collections::{BTreeMap, VecDeque};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

use assessment::{AssessmentAnswer, AssessmentOutcome};
use generator::{render_hint, QuestionGenerator};
use progression::ProgressionLedger;
use selector::PracticeSelector;
use skill::SkillModel;
use snapshot::ProfileDocument;
use stats::{StatsAggregator, StatsReport, StatsView};
use trend::{Prediction, TrendPredictor};
use types::{
    Attempt, Operation, PracticeQueue, Question, Session, SessionMode, SessionSummary, Settings,
    SkillRecord, UserProfile,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionParams {
    /// Operations for a targeted session; ignored by the other modes.
    pub operations: Option<Vec<Operation>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStart {
    pub session_id: String,
    pub mode: SessionMode,
    /// True when a practice queue fell back to targeted generation
    /// because its candidate pool was empty.
    pub degraded: bool,
    pub queue_len: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutcome {
    pub correct: bool,
    pub correct_answer: f64,
    pub response_time_ms: i64,
    pub xp_awarded: i64,
    pub leveled_up: bool,
    pub new_level: u32,
}

struct ActiveSession {
    session: Session,
    queue: VecDeque<Question>,
    pending: Option<Question>,
    /// When the pending question was first handed out. Practice queues
    /// are built up front, so `created_at` is not a delivery time.
    pending_issued_at: i64,
}

struct EngineState {
    profile: UserProfile,
    settings: Settings,
    skills: BTreeMap<Operation, SkillRecord>,
    sessions: Vec<Session>,
    active: Option<ActiveSession>,
    pending_assessment: Option<Vec<Question>>,
    stats: StatsAggregator,
    generator: QuestionGenerator,
    selector: PracticeSelector,
}

/// The facade the presentation layer talks to. All commands take the
/// write lock for one discrete operation; `snapshot` only ever observes
/// a consistent document. The engine performs no I/O.
pub struct PracticeEngine {
    skill_model: SkillModel,
    ledger: ProgressionLedger,
    predictor: TrendPredictor,
    state: RwLock<EngineState>,
}

impl PracticeEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::build(
            config.clone(),
            QuestionGenerator::new(config.generator),
            PracticeSelector::new(config.selector),
        )
    }

    /// Deterministic variant for tests.
    pub fn with_seed(config: EngineConfig, seed: u64) -> Self {
        Self::build(
            config.clone(),
            QuestionGenerator::with_seed(config.generator, seed),
            PracticeSelector::with_seed(config.selector, seed.wrapping_add(1)),
        )
    }

    fn build(
        config: EngineConfig,
        generator: QuestionGenerator,
        selector: PracticeSelector,
    ) -> Self {
        let skill_model = SkillModel::new(config.skill);
        let skills = neutral_skills(&skill_model);
        Self {
            ledger: ProgressionLedger::new(config.progression),
            predictor: TrendPredictor::new(config.trend),
            skill_model,
            state: RwLock::new(EngineState {
                profile: UserProfile::default(),
                settings: Settings::default(),
                skills,
                sessions: Vec::new(),
                active: None,
                pending_assessment: None,
                stats: StatsAggregator::default(),
                generator,
                selector,
            }),
        }
    }

    pub fn start_session(
        &self,
        mode: SessionMode,
        params: SessionParams,
    ) -> EngineResult<SessionStart> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        if state.active.is_some() {
            return Err(EngineError::SessionActive);
        }

        let enabled = state.settings.enabled_operations.clone();
        let with_choices = state.settings.answer_mode == types::InputMode::Choice;

        let queue = match mode {
            SessionMode::Normal => PracticeQueue::default(),
            SessionMode::PracticeTargeted => {
                let operations = match params.operations {
                    Some(requested) => {
                        let filtered: Vec<Operation> = requested
                            .into_iter()
                            .filter(|op| enabled.contains(op))
                            .collect();
                        if filtered.is_empty() {
                            return Err(EngineError::Validation(
                                "targeted practice needs at least one enabled operation"
                                    .to_string(),
                            ));
                        }
                        filtered
                    }
                    None => enabled.clone(),
                };
                state.selector.targeted(
                    &operations,
                    &state.skills,
                    &mut state.generator,
                    with_choices,
                )?
            }
            SessionMode::PracticeMistakes => {
                let history: Vec<&Attempt> = state
                    .sessions
                    .iter()
                    .flat_map(|s| s.attempts.iter())
                    .collect();
                state.selector.mistakes(
                    &history,
                    &enabled,
                    &state.skills,
                    &mut state.generator,
                    with_choices,
                )?
            }
            SessionMode::PracticeSlow => {
                let history: Vec<&Attempt> = state
                    .sessions
                    .iter()
                    .flat_map(|s| s.attempts.iter())
                    .collect();
                state.selector.slow(
                    &history,
                    &enabled,
                    &state.skills,
                    &mut state.generator,
                    self.skill_model.alpha(),
                    self.skill_model.baseline_ms(),
                    with_choices,
                )?
            }
        };

        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            mode,
            start_time: chrono::Utc::now().timestamp_millis(),
            end_time: None,
            attempts: Vec::new(),
            summary: None,
        };
        let start = SessionStart {
            session_id: session.id.clone(),
            mode,
            degraded: queue.degraded,
            queue_len: queue.questions.len(),
        };
        tracing::info!(
            session_id = %start.session_id,
            mode = mode.as_str(),
            degraded = start.degraded,
            queue_len = start.queue_len,
            "session started"
        );
        state.active = Some(ActiveSession {
            session,
            queue: queue.questions.into(),
            pending: None,
            pending_issued_at: 0,
        });
        Ok(start)
    }

    /// Next question for the active session. Calling again without
    /// submitting re-delivers the same pending question.
    pub fn next_question(&self) -> EngineResult<Question> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let enabled = state.settings.enabled_operations.clone();
        let with_choices = state.settings.answer_mode == types::InputMode::Choice;
        let active = state.active.as_mut().ok_or(EngineError::NoActiveSession)?;

        if let Some(pending) = &active.pending {
            return Ok(pending.clone());
        }

        let question = match active.session.mode {
            SessionMode::Normal => {
                let operation = state
                    .selector
                    .random_operation(&enabled)
                    .ok_or_else(|| {
                        EngineError::Validation("no operations enabled".to_string())
                    })?;
                let tier = state
                    .skills
                    .get(&operation)
                    .map(|s| s.tier)
                    .unwrap_or_default();
                state.generator.generate(operation, tier, with_choices)?
            }
            _ => active.queue.pop_front().ok_or(EngineError::QueueExhausted)?,
        };
        active.pending = Some(question.clone());
        active.pending_issued_at = chrono::Utc::now().timestamp_millis();
        Ok(question)
    }

    /// Mental-math hint for the pending question.
    pub fn hint(&self) -> EngineResult<String> {
        let guard = self.state.read();
        let active = guard.active.as_ref().ok_or(EngineError::NoActiveSession)?;
        let pending = active.pending.as_ref().ok_or(EngineError::NoPendingQuestion)?;
        Ok(render_hint(pending.operation, &pending.operands))
    }

    /// Grades against the wall clock since the question was issued.
    pub fn submit_answer(&self, value: f64) -> EngineResult<AnswerOutcome> {
        self.submit(value, None)
    }

    /// Grades with a caller-measured response time.
    pub fn submit_answer_timed(&self, value: f64, response_time_ms: i64) -> EngineResult<AnswerOutcome> {
        if response_time_ms <= 0 {
            return Err(EngineError::Validation(
                "response time must be positive".to_string(),
            ));
        }
        self.submit(value, Some(response_time_ms))
    }

    fn submit(&self, value: f64, response_time_ms: Option<i64>) -> EngineResult<AnswerOutcome> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let input_mode = state.settings.answer_mode;
        let active = state.active.as_mut().ok_or(EngineError::NoActiveSession)?;
        let question = active.pending.take().ok_or(EngineError::NoPendingQuestion)?;
        let issued_at = active.pending_issued_at;

        let now = chrono::Utc::now().timestamp_millis();
        let rt = response_time_ms
            .unwrap_or_else(|| now - issued_at)
            .max(1);
        let correct = (value - question.correct_answer).abs() < 1e-6;

        let record = state
            .skills
            .entry(question.operation)
            .or_insert_with(|| self.skill_model.seed_neutral());
        // XP is judged against the expectation held before this attempt.
        let ema_before = record.ema_response_time_ms;
        self.skill_model.record_attempt(record, correct, rt);

        let outcome = self.ledger.apply_outcome(
            &mut state.profile,
            question.operation,
            correct,
            rt,
            ema_before,
            input_mode,
        );

        let attempt = Attempt {
            question_id: question.id.clone(),
            operation: question.operation,
            operands: question.operands.clone(),
            correct,
            response_time_ms: rt,
            timestamp: now,
            xp_awarded: outcome.xp_awarded,
            input_mode,
        };
        state.stats.record(&attempt);
        active.session.attempts.push(attempt);

        tracing::debug!(
            question_id = %question.id,
            operation = question.operation.as_str(),
            correct,
            response_time_ms = rt,
            xp = outcome.xp_awarded,
            "answer recorded"
        );
        if outcome.leveled_up {
            tracing::info!(level = outcome.new_level, "level up");
        }

        Ok(AnswerOutcome {
            correct,
            correct_answer: question.correct_answer,
            response_time_ms: rt,
            xp_awarded: outcome.xp_awarded,
            leveled_up: outcome.leveled_up,
            new_level: outcome.new_level,
        })
    }

    /// Closes the active session; an unanswered pending question is
    /// discarded without becoming an attempt.
    pub fn end_session(&self) -> EngineResult<SessionSummary> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let mut active = state.active.take().ok_or(EngineError::NoActiveSession)?;
        active.session.end_time = Some(chrono::Utc::now().timestamp_millis());
        let summary = stats::summarize(&active.session.attempts);
        active.session.summary = Some(summary.clone());
        tracing::info!(
            session_id = %active.session.id,
            attempts = active.session.attempts.len(),
            accuracy = summary.accuracy,
            "session ended"
        );
        state.sessions.push(active.session);
        Ok(summary)
    }

    pub fn get_stats(&self, view: StatsView) -> StatsReport {
        let guard = self.state.read();
        match view {
            StatsView::Overview => StatsReport::Overview(
                guard.stats.overview(&guard.profile, guard.sessions.len()),
            ),
            StatsView::Operations => StatsReport::Operations {
                items: guard.stats.operations(&guard.skills),
            },
            StatsView::Sessions => StatsReport::Sessions {
                items: StatsAggregator::sessions(&guard.sessions, 20),
            },
        }
    }

    /// Speculative linear projection over recent closed sessions.
    pub fn get_prediction(&self, operation: Option<Operation>) -> Prediction {
        let guard = self.state.read();
        self.predictor.predict(&guard.sessions, operation)
    }

    /// Starts the one-time calibration run. Errors once a score exists.
    pub fn request_assessment(&self) -> EngineResult<Vec<Question>> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        if state.profile.initial_assessment_score.is_some() {
            return Err(EngineError::AssessmentAlreadyDone);
        }
        let enabled = state.settings.enabled_operations.clone();
        let questions = assessment::calibration_questions(&mut state.generator, &enabled)?;
        state.pending_assessment = Some(questions.clone());
        Ok(questions)
    }

    /// Grades the calibration run, seeds the skill records, and stores
    /// the overall score. Returns that score.
    pub fn complete_assessment(&self, answers: &[AssessmentAnswer]) -> EngineResult<f64> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let questions = state
            .pending_assessment
            .take()
            .ok_or(EngineError::NoAssessmentPending)?;
        let AssessmentOutcome {
            overall_accuracy,
            seeds,
        } = match assessment::grade(&questions, answers, &self.skill_model) {
            Ok(outcome) => outcome,
            Err(err) => {
                // Leave the run in place so the caller can resubmit.
                state.pending_assessment = Some(questions);
                return Err(err);
            }
        };
        for (operation, seed) in seeds {
            state.skills.insert(operation, seed);
        }
        state.profile.initial_assessment_score = Some(overall_accuracy);
        tracing::info!(score = overall_accuracy, "initial assessment completed");
        Ok(overall_accuracy)
    }

    /// Resets profile, history, skills, and settings in one step.
    /// Idempotent; the only destructive operation the engine has.
    pub fn wipe_all_data(&self) {
        let mut guard = self.state.write();
        let state = &mut *guard;
        state.profile = UserProfile::default();
        state.settings = Settings::default();
        state.skills = neutral_skills(&self.skill_model);
        state.sessions.clear();
        state.active = None;
        state.pending_assessment = None;
        state.stats = StatsAggregator::default();
        tracing::info!("all user data wiped");
    }

    /// Consistent copy of everything persistable, including the open
    /// session (with a null end time) so autosave never drops attempts.
    pub fn snapshot(&self) -> ProfileDocument {
        let guard = self.state.read();
        let mut sessions = guard.sessions.clone();
        if let Some(active) = &guard.active {
            sessions.push(active.session.clone());
        }
        ProfileDocument {
            version: snapshot::DOCUMENT_VERSION,
            profile: guard.profile.clone(),
            settings: guard.settings.clone(),
            skill_records: guard.skills.clone(),
            sessions,
        }
    }

    /// Replaces in-memory state with a validated document. A trailing
    /// session without an end time resumes as the active session; its
    /// queue is transient and starts empty.
    pub fn restore(&self, document: ProfileDocument) -> EngineResult<()> {
        let document = document.validated()?;
        let mut guard = self.state.write();
        let state = &mut *guard;

        let mut closed = Vec::with_capacity(document.sessions.len());
        let mut open = None;
        for mut session in document.sessions {
            if session.end_time.is_none() {
                // Only the newest open session survives a restart.
                if let Some(stale) = open.replace(session) {
                    closed.push(close_stale(stale));
                }
            } else {
                session.summary = session
                    .summary
                    .or_else(|| Some(stats::summarize(&session.attempts)));
                closed.push(session);
            }
        }

        state.profile = document.profile;
        state.settings = document.settings;
        state.skills = document.skill_records;
        for operation in Operation::ALL {
            state
                .skills
                .entry(operation)
                .or_insert_with(|| self.skill_model.seed_neutral());
        }
        // Tiers are derived state; recompute under the current thresholds.
        for record in state.skills.values_mut() {
            record.tier = self.skill_model.tier_for(record);
        }
        state.sessions = closed;
        state.active = open.map(|session| ActiveSession {
            session,
            queue: VecDeque::new(),
            pending: None,
            pending_issued_at: 0,
        });
        state.pending_assessment = None;
        state.stats = StatsAggregator::rebuild(
            &state.sessions,
            state.active.as_ref().map(|a| &a.session),
        );
        tracing::info!(
            sessions = state.sessions.len(),
            resumed_open_session = state.active.is_some(),
            "state restored"
        );
        Ok(())
    }

    pub fn settings(&self) -> Settings {
        self.state.read().settings.clone()
    }

    pub fn update_settings(&self, settings: Settings) -> EngineResult<()> {
        if !settings.is_valid() {
            return Err(EngineError::Validation(
                "settings out of range: duration must be 30..=300 seconds with at least one operation enabled".to_string(),
            ));
        }
        self.state.write().settings = settings.clamped();
        Ok(())
    }

    pub fn profile(&self) -> UserProfile {
        self.state.read().profile.clone()
    }

    pub fn skill(&self, operation: Operation) -> SkillRecord {
        self.state
            .read()
            .skills
            .get(&operation)
            .cloned()
            .unwrap_or_else(|| self.skill_model.seed_neutral())
    }

    /// True while a session is open.
    pub fn session_active(&self) -> bool {
        self.state.read().active.is_some()
    }
}

fn neutral_skills(model: &SkillModel) -> BTreeMap<Operation, SkillRecord> {
    Operation::ALL
        .iter()
        .map(|op| (*op, model.seed_neutral()))
        .collect()
}

fn close_stale(mut session: Session) -> Session {
    session.end_time = Some(session.start_time);
    session.summary = Some(stats::summarize(&session.attempts));
    session
}
