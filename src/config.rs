use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillParams {
    /// EMA smoothing factor shared by accuracy and response-time tracks.
    pub alpha: f64,
    /// Reference response time a neutral learner is assumed to have.
    pub baseline_ms: f64,
    /// Score thresholds separating tiers 0..=N.
    pub tier_thresholds: Vec<f64>,
}

impl Default for SkillParams {
    fn default() -> Self {
        Self {
            alpha: 0.2,
            baseline_ms: 3000.0,
            tier_thresholds: vec![0.25, 0.45, 0.70, 1.00, 1.30],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorParams {
    /// Attempts before falling back to a fixed safe operand set.
    pub max_retries: u32,
    /// Number of recent operand tuples never repeated, per operation.
    pub repetition_window: usize,
    /// Options produced for multiple-choice questions, answer included.
    pub choice_count: usize,
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self {
            max_retries: 16,
            repetition_window: 5,
            choice_count: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorParams {
    pub queue_size: usize,
    /// An attempt is "slow" when rt exceeds slow_factor times the EMA
    /// response time the learner had at that moment.
    pub slow_factor: f64,
    /// Per-attempt-of-age multiplier applied to candidate weights.
    pub recency_decay: f64,
}

impl Default for SelectorParams {
    fn default() -> Self {
        Self {
            queue_size: 10,
            slow_factor: 1.3,
            recency_decay: 0.97,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressionParams {
    pub level_base_xp: f64,
    pub level_growth: f64,
    /// Multiplier applied when the answer came from multiple choice.
    pub choice_multiplier: f64,
}

impl Default for ProgressionParams {
    fn default() -> Self {
        Self {
            level_base_xp: 100.0,
            level_growth: 1.5,
            choice_multiplier: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendParams {
    /// Closed sessions considered for a projection.
    pub window_size: usize,
    /// Projected response times never drop below this floor.
    pub min_time_ms: f64,
}

impl Default for TrendParams {
    fn default() -> Self {
        Self {
            window_size: 10,
            min_time_ms: 500.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutosaveParams {
    pub interval_secs: u64,
}

impl Default for AutosaveParams {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    pub skill: SkillParams,
    pub generator: GeneratorParams,
    pub selector: SelectorParams,
    pub progression: ProgressionParams,
    pub trend: TrendParams,
    pub autosave: AutosaveParams,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("TRAINER_EMA_ALPHA") {
            if let Ok(alpha) = val.parse::<f64>() {
                if alpha > 0.0 && alpha <= 1.0 {
                    config.skill.alpha = alpha;
                }
            }
        }
        if let Ok(val) = std::env::var("TRAINER_QUEUE_SIZE") {
            if let Ok(size) = val.parse::<usize>() {
                if size > 0 {
                    config.selector.queue_size = size;
                }
            }
        }
        if let Ok(val) = std::env::var("TRAINER_AUTOSAVE_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                if secs > 0 {
                    config.autosave.interval_secs = secs;
                }
            }
        }

        config
    }
}
