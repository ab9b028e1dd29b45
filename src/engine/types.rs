use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Root,
    Percent,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Self::Add,
        Self::Subtract,
        Self::Multiply,
        Self::Divide,
        Self::Power,
        Self::Root,
        Self::Percent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Divide => "divide",
            Self::Power => "power",
            Self::Root => "root",
            Self::Percent => "percent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "add" => Some(Self::Add),
            "subtract" => Some(Self::Subtract),
            "multiply" => Some(Self::Multiply),
            "divide" => Some(Self::Divide),
            "power" => Some(Self::Power),
            "root" => Some(Self::Root),
            "percent" => Some(Self::Percent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum InputMode {
    #[default]
    Text,
    Choice,
}

impl InputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Choice => "choice",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[derive(Default)]
pub enum SessionMode {
    #[default]
    Normal,
    PracticeTargeted,
    PracticeMistakes,
    PracticeSlow,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::PracticeTargeted => "practiceTargeted",
            Self::PracticeMistakes => "practiceMistakes",
            Self::PracticeSlow => "practiceSlow",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub operation: Operation,
    pub operands: Vec<f64>,
    pub correct_answer: f64,
    pub tier: u8,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<f64>>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub question_id: String,
    pub operation: Operation,
    pub operands: Vec<f64>,
    pub correct: bool,
    pub response_time_ms: i64,
    pub timestamp: i64,
    pub xp_awarded: i64,
    pub input_mode: InputMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Fraction of correct attempts, 0.0 when the session had none.
    pub accuracy: f64,
    pub avg_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub mode: SessionMode,
    pub start_time: i64,
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub attempts: Vec<Attempt>,
    #[serde(default)]
    pub summary: Option<SessionSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillRecord {
    pub ema_accuracy: f64,
    pub ema_response_time_ms: f64,
    pub attempt_count: u64,
    #[serde(default)]
    pub recent_mistake_count: u64,
    pub tier: u8,
}

impl Default for SkillRecord {
    fn default() -> Self {
        Self {
            ema_accuracy: 0.5,
            ema_response_time_ms: 3000.0,
            attempt_count: 0,
            recent_mistake_count: 0,
            tier: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub level: u32,
    pub xp: i64,
    pub xp_to_next: i64,
    #[serde(default)]
    pub initial_assessment_score: Option<f64>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            level: 1,
            xp: 0,
            // threshold to reach level 2 under the default curve
            xp_to_next: 150,
            initial_assessment_score: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub theme: Theme,
    pub game_duration_sec: u32,
    pub enabled_operations: Vec<Operation>,
    pub answer_mode: InputMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            game_duration_sec: 120,
            enabled_operations: Operation::ALL.to_vec(),
            answer_mode: InputMode::Text,
        }
    }
}

impl Settings {
    pub const MIN_DURATION_SEC: u32 = 30;
    pub const MAX_DURATION_SEC: u32 = 300;

    /// Returns a copy with out-of-range fields pulled back to valid values.
    pub fn clamped(&self) -> Self {
        let mut settings = self.clone();
        settings.game_duration_sec = settings
            .game_duration_sec
            .clamp(Self::MIN_DURATION_SEC, Self::MAX_DURATION_SEC);
        // Drop duplicates wherever they appear, keeping first-seen order;
        // a doubled entry would skew targeted round-robin toward it.
        let mut seen = std::collections::BTreeSet::new();
        settings.enabled_operations.retain(|op| seen.insert(*op));
        if settings.enabled_operations.is_empty() {
            settings.enabled_operations = Operation::ALL.to_vec();
        }
        settings
    }

    pub fn is_valid(&self) -> bool {
        (Self::MIN_DURATION_SEC..=Self::MAX_DURATION_SEC).contains(&self.game_duration_sec)
            && !self.enabled_operations.is_empty()
    }
}

/// Ordered batch of questions for a practice session. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct PracticeQueue {
    pub questions: Vec<Question>,
    /// True when the candidate pool was empty and the queue fell back to
    /// targeted generation over the enabled operations.
    pub degraded: bool,
}
