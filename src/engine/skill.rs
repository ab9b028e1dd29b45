use crate::config::SkillParams;
use crate::engine::types::SkillRecord;

/// Exponential-moving-average skill tracker. One record per operation;
/// accuracy and response time move on the same smoothing factor so a
/// single attempt can never swing a mature record.
#[derive(Debug, Clone)]
pub struct SkillModel {
    params: SkillParams,
}

impl SkillModel {
    pub fn new(params: SkillParams) -> Self {
        Self { params }
    }

    pub fn baseline_ms(&self) -> f64 {
        self.params.baseline_ms
    }

    pub fn alpha(&self) -> f64 {
        self.params.alpha
    }

    /// Neutral cold-start record: 0.5 accuracy at baseline speed.
    pub fn seed_neutral(&self) -> SkillRecord {
        let mut record = SkillRecord {
            ema_accuracy: 0.5,
            ema_response_time_ms: self.params.baseline_ms,
            attempt_count: 0,
            recent_mistake_count: 0,
            tier: 0,
        };
        record.tier = self.tier_for(&record);
        record
    }

    /// Seed derived from a measured calibration run, blended toward the
    /// neutral prior so a couple of lucky answers cannot start a learner
    /// at the top tier.
    pub fn seed_from_calibration(&self, accuracy: f64, avg_response_ms: f64) -> SkillRecord {
        let blended = (0.5 + accuracy.clamp(0.0, 1.0)) / 2.0;
        let rt = avg_response_ms.clamp(500.0, self.params.baseline_ms * 3.0);
        let mut record = SkillRecord {
            ema_accuracy: blended,
            ema_response_time_ms: rt,
            attempt_count: 0,
            recent_mistake_count: 0,
            tier: 0,
        };
        record.tier = self.tier_for(&record);
        record
    }

    /// Folds one attempt into the record and rederives the tier.
    pub fn record_attempt(&self, record: &mut SkillRecord, correct: bool, response_time_ms: i64) {
        let alpha = self.params.alpha;
        let observed = if correct { 1.0 } else { 0.0 };
        record.ema_accuracy =
            (alpha * observed + (1.0 - alpha) * record.ema_accuracy).clamp(0.0, 1.0);

        let rt = (response_time_ms.max(1)) as f64;
        record.ema_response_time_ms =
            (alpha * rt + (1.0 - alpha) * record.ema_response_time_ms).max(1.0);

        record.attempt_count += 1;
        if correct {
            record.recent_mistake_count = record.recent_mistake_count.saturating_sub(1);
        } else {
            record.recent_mistake_count += 1;
        }
        record.tier = self.tier_for(record);
    }

    /// Composite score: accuracy scaled by speed relative to baseline.
    /// A neutral record scores 0.5; faster-than-baseline pushes above it.
    pub fn score(&self, record: &SkillRecord) -> f64 {
        let speed = self.params.baseline_ms / record.ema_response_time_ms.max(1.0);
        record.ema_accuracy * speed
    }

    pub fn tier_for(&self, record: &SkillRecord) -> u8 {
        let score = self.score(record);
        let mut tier = 0u8;
        for threshold in &self.params.tier_thresholds {
            if score >= *threshold {
                tier += 1;
            } else {
                break;
            }
        }
        tier
    }
}
