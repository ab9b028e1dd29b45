use crate::config::ProgressionParams;
use crate::engine::types::{InputMode, Operation, UserProfile};

/// Result of folding one answer outcome into the profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XpOutcome {
    pub xp_awarded: i64,
    pub leveled_up: bool,
    pub new_level: u32,
}

/// XP and level bookkeeping. XP is only granted for correct answers;
/// level-ups cascade and carry leftover XP into the next level.
#[derive(Debug, Clone)]
pub struct ProgressionLedger {
    params: ProgressionParams,
}

impl ProgressionLedger {
    pub fn new(params: ProgressionParams) -> Self {
        Self { params }
    }

    /// XP required to reach `level` from the level below it.
    pub fn xp_for_level(&self, level: u32) -> i64 {
        if level <= 1 {
            return self.params.level_base_xp as i64;
        }
        (self.params.level_base_xp * self.params.level_growth.powi(level as i32 - 1)) as i64
    }

    /// The `xpToNext` threshold a profile at `level` should carry.
    pub fn threshold_for(&self, level: u32) -> i64 {
        self.xp_for_level(level + 1)
    }

    pub fn base_xp(&self, operation: Operation) -> i64 {
        match operation {
            Operation::Add | Operation::Subtract => 10,
            Operation::Multiply | Operation::Divide | Operation::Percent => 12,
            Operation::Power | Operation::Root => 15,
        }
    }

    /// Stepped bonus against the EMA response time the learner carried
    /// into this attempt. Floor 0.8, cap 1.5.
    pub fn speed_bonus(&self, response_time_ms: i64, ema_response_time_ms: f64) -> f64 {
        let rt = response_time_ms.max(1) as f64;
        let ema = ema_response_time_ms.max(1.0);
        if rt <= 0.5 * ema {
            1.5
        } else if rt <= 0.75 * ema {
            1.2
        } else if rt <= ema {
            1.1
        } else if rt <= 1.5 * ema {
            1.0
        } else {
            0.8
        }
    }

    pub fn input_multiplier(&self, mode: InputMode) -> f64 {
        match mode {
            InputMode::Text => 1.0,
            InputMode::Choice => self.params.choice_multiplier,
        }
    }

    /// Applies one outcome. Restores `xp < xpToNext` before returning.
    pub fn apply_outcome(
        &self,
        profile: &mut UserProfile,
        operation: Operation,
        correct: bool,
        response_time_ms: i64,
        ema_response_time_ms: f64,
        input_mode: InputMode,
    ) -> XpOutcome {
        if !correct {
            return XpOutcome {
                xp_awarded: 0,
                leveled_up: false,
                new_level: profile.level,
            };
        }

        let bonus = self.speed_bonus(response_time_ms, ema_response_time_ms);
        let xp = (self.base_xp(operation) as f64 * self.input_multiplier(input_mode) * bonus)
            .round() as i64;

        profile.xp += xp;
        let mut leveled_up = false;
        while profile.xp >= profile.xp_to_next {
            profile.xp -= profile.xp_to_next;
            profile.level += 1;
            profile.xp_to_next = self.threshold_for(profile.level);
            leveled_up = true;
        }

        XpOutcome {
            xp_awarded: xp,
            leveled_up,
            new_level: profile.level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProgressionParams;

    fn ledger() -> ProgressionLedger {
        ProgressionLedger::new(ProgressionParams::default())
    }

    #[test]
    fn fast_text_answer_earns_boosted_xp() {
        let ledger = ledger();
        let mut profile = UserProfile {
            level: 3,
            xp: 80,
            xp_to_next: 100,
            initial_assessment_score: None,
        };
        let outcome = ledger.apply_outcome(
            &mut profile,
            Operation::Add,
            true,
            1800,
            2500.0,
            InputMode::Text,
        );
        assert_eq!(outcome.xp_awarded, 12);
        assert!(!outcome.leveled_up);
        assert_eq!(profile.level, 3);
        assert_eq!(profile.xp, 92);
    }

    #[test]
    fn level_up_carries_leftover_xp() {
        let ledger = ledger();
        let mut profile = UserProfile {
            level: 3,
            xp: 95,
            xp_to_next: 100,
            initial_assessment_score: None,
        };
        let outcome = ledger.apply_outcome(
            &mut profile,
            Operation::Add,
            true,
            1800,
            2500.0,
            InputMode::Text,
        );
        assert_eq!(outcome.xp_awarded, 12);
        assert!(outcome.leveled_up);
        assert_eq!(profile.level, 4);
        assert_eq!(profile.xp, 7);
        assert!(profile.xp < profile.xp_to_next);
        assert_eq!(profile.xp_to_next, ledger.threshold_for(4));
    }

    #[test]
    fn incorrect_answers_earn_nothing() {
        let ledger = ledger();
        let mut profile = UserProfile::default();
        let outcome = ledger.apply_outcome(
            &mut profile,
            Operation::Power,
            false,
            500,
            3000.0,
            InputMode::Text,
        );
        assert_eq!(outcome.xp_awarded, 0);
        assert_eq!(profile.xp, 0);
        assert_eq!(profile.level, 1);
    }

    #[test]
    fn choice_answers_earn_less_than_text() {
        let ledger = ledger();
        let mut text = UserProfile::default();
        let mut choice = UserProfile::default();
        let a = ledger.apply_outcome(&mut text, Operation::Multiply, true, 3000, 3000.0, InputMode::Text);
        let b = ledger.apply_outcome(
            &mut choice,
            Operation::Multiply,
            true,
            3000,
            3000.0,
            InputMode::Choice,
        );
        assert!(b.xp_awarded < a.xp_awarded);
    }

    #[test]
    fn thresholds_grow_monotonically() {
        let ledger = ledger();
        let mut previous = 0;
        for level in 1..30 {
            let threshold = ledger.threshold_for(level);
            assert!(threshold > previous, "level {level}");
            previous = threshold;
        }
    }

    #[test]
    fn speed_bonus_is_bounded() {
        let ledger = ledger();
        assert_eq!(ledger.speed_bonus(100, 3000.0), 1.5);
        assert_eq!(ledger.speed_bonus(60_000, 3000.0), 0.8);
        assert_eq!(ledger.speed_bonus(3000, 3000.0), 1.1);
    }

    #[test]
    fn xp_stays_below_threshold_after_long_streak() {
        let ledger = ledger();
        let mut profile = UserProfile::default();
        for _ in 0..500 {
            ledger.apply_outcome(
                &mut profile,
                Operation::Root,
                true,
                1000,
                3000.0,
                InputMode::Text,
            );
            assert!(profile.xp < profile.xp_to_next);
            assert!(profile.xp >= 0);
        }
        assert!(profile.level > 1);
    }
}
