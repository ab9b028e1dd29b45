use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::types::{
    Attempt, Operation, Session, SessionMode, SessionSummary, SkillRecord, UserProfile,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum StatsView {
    #[default]
    Overview,
    Operations,
    Sessions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewStats {
    pub level: u32,
    pub xp: i64,
    pub xp_to_next: i64,
    pub sessions: usize,
    pub attempts: u64,
    pub correct: u64,
    pub accuracy: f64,
    pub avg_time_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStats {
    pub operation: Operation,
    pub attempts: u64,
    pub correct: u64,
    pub accuracy: f64,
    pub avg_time_ms: f64,
    pub tier: u8,
    pub ema_accuracy: f64,
    pub ema_response_time_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDigest {
    pub id: String,
    pub mode: SessionMode,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub attempts: usize,
    pub summary: Option<SessionSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", rename_all = "camelCase")]
pub enum StatsReport {
    Overview(OverviewStats),
    Operations { items: Vec<OperationStats> },
    Sessions { items: Vec<SessionDigest> },
}

#[derive(Debug, Clone, Copy, Default)]
struct OperationTotals {
    attempts: u64,
    correct: u64,
    total_time_ms: i64,
}

/// Running cumulative counters per operation. Not persisted: the session
/// history is the source of truth and `rebuild` replays it after restore.
#[derive(Debug, Clone, Default)]
pub struct StatsAggregator {
    totals: BTreeMap<Operation, OperationTotals>,
}

impl StatsAggregator {
    pub fn rebuild(sessions: &[Session], active: Option<&Session>) -> Self {
        let mut aggregator = Self::default();
        for session in sessions {
            for attempt in &session.attempts {
                aggregator.record(attempt);
            }
        }
        if let Some(session) = active {
            for attempt in &session.attempts {
                aggregator.record(attempt);
            }
        }
        aggregator
    }

    pub fn record(&mut self, attempt: &Attempt) {
        let totals = self.totals.entry(attempt.operation).or_default();
        totals.attempts += 1;
        if attempt.correct {
            totals.correct += 1;
        }
        totals.total_time_ms += attempt.response_time_ms.max(0);
    }

    pub fn overview(&self, profile: &UserProfile, closed_sessions: usize) -> OverviewStats {
        let attempts: u64 = self.totals.values().map(|t| t.attempts).sum();
        let correct: u64 = self.totals.values().map(|t| t.correct).sum();
        let total_time: i64 = self.totals.values().map(|t| t.total_time_ms).sum();
        OverviewStats {
            level: profile.level,
            xp: profile.xp,
            xp_to_next: profile.xp_to_next,
            sessions: closed_sessions,
            attempts,
            correct,
            accuracy: if attempts > 0 {
                correct as f64 / attempts as f64
            } else {
                0.0
            },
            avg_time_ms: if attempts > 0 {
                total_time as f64 / attempts as f64
            } else {
                0.0
            },
        }
    }

    /// Per-operation breakdown, weakest accuracy first so callers can use
    /// the head of the list as a practice suggestion.
    pub fn operations(&self, skills: &BTreeMap<Operation, SkillRecord>) -> Vec<OperationStats> {
        let mut items: Vec<OperationStats> = Operation::ALL
            .iter()
            .map(|operation| {
                let totals = self.totals.get(operation).copied().unwrap_or_default();
                let skill = skills.get(operation).cloned().unwrap_or_default();
                OperationStats {
                    operation: *operation,
                    attempts: totals.attempts,
                    correct: totals.correct,
                    accuracy: if totals.attempts > 0 {
                        totals.correct as f64 / totals.attempts as f64
                    } else {
                        0.0
                    },
                    avg_time_ms: if totals.attempts > 0 {
                        totals.total_time_ms as f64 / totals.attempts as f64
                    } else {
                        0.0
                    },
                    tier: skill.tier,
                    ema_accuracy: skill.ema_accuracy,
                    ema_response_time_ms: skill.ema_response_time_ms,
                }
            })
            .collect();
        items.sort_by(|a, b| {
            a.accuracy
                .partial_cmp(&b.accuracy)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        items
    }

    pub fn sessions(sessions: &[Session], limit: usize) -> Vec<SessionDigest> {
        sessions
            .iter()
            .rev()
            .take(limit)
            .map(|session| SessionDigest {
                id: session.id.clone(),
                mode: session.mode,
                start_time: session.start_time,
                end_time: session.end_time,
                attempts: session.attempts.len(),
                summary: session.summary.clone(),
            })
            .collect()
    }
}

/// Summary for a closing session; zeroes when it had no attempts.
pub fn summarize(attempts: &[Attempt]) -> SessionSummary {
    if attempts.is_empty() {
        return SessionSummary {
            accuracy: 0.0,
            avg_time_ms: 0.0,
        };
    }
    let correct = attempts.iter().filter(|a| a.correct).count();
    let total_time: i64 = attempts.iter().map(|a| a.response_time_ms.max(0)).sum();
    SessionSummary {
        accuracy: correct as f64 / attempts.len() as f64,
        avg_time_ms: total_time as f64 / attempts.len() as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::InputMode;

    fn attempt(operation: Operation, correct: bool, rt: i64) -> Attempt {
        Attempt {
            question_id: "q".to_string(),
            operation,
            operands: vec![1.0, 2.0],
            correct,
            response_time_ms: rt,
            timestamp: 0,
            xp_awarded: 0,
            input_mode: InputMode::Text,
        }
    }

    #[test]
    fn summary_averages_attempts() {
        let attempts = vec![
            attempt(Operation::Add, true, 1000),
            attempt(Operation::Add, false, 3000),
        ];
        let summary = summarize(&attempts);
        assert!((summary.accuracy - 0.5).abs() < 1e-12);
        assert!((summary.avg_time_ms - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn empty_session_summarizes_to_zero() {
        let summary = summarize(&[]);
        assert_eq!(summary.accuracy, 0.0);
        assert_eq!(summary.avg_time_ms, 0.0);
    }

    #[test]
    fn operations_view_sorts_weakest_first() {
        let mut aggregator = StatsAggregator::default();
        for _ in 0..4 {
            aggregator.record(&attempt(Operation::Add, true, 1000));
        }
        aggregator.record(&attempt(Operation::Root, false, 5000));
        let skills = BTreeMap::new();
        let items = aggregator.operations(&skills);
        assert_eq!(items.len(), Operation::ALL.len());
        assert!(items[0].accuracy <= items.last().map(|i| i.accuracy).unwrap_or(1.0));
        let add = items
            .iter()
            .find(|i| i.operation == Operation::Add)
            .unwrap();
        assert_eq!(add.attempts, 4);
        assert_eq!(add.correct, 4);
    }

    #[test]
    fn rebuild_matches_incremental_recording() {
        let attempts = vec![
            attempt(Operation::Multiply, true, 900),
            attempt(Operation::Multiply, false, 2100),
            attempt(Operation::Divide, true, 1400),
        ];
        let mut incremental = StatsAggregator::default();
        for a in &attempts {
            incremental.record(a);
        }
        let session = Session {
            id: "s".to_string(),
            mode: SessionMode::Normal,
            start_time: 0,
            end_time: Some(1),
            attempts,
            summary: None,
        };
        let rebuilt = StatsAggregator::rebuild(std::slice::from_ref(&session), None);
        let profile = UserProfile::default();
        let a = incremental.overview(&profile, 1);
        let b = rebuilt.overview(&profile, 1);
        assert_eq!(a.attempts, b.attempts);
        assert_eq!(a.correct, b.correct);
        assert_eq!(a.avg_time_ms, b.avg_time_ms);
    }
}
