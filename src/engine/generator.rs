use std::collections::{HashMap, VecDeque};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::GeneratorParams;
use crate::engine::types::{Operation, Question};
use crate::error::{EngineError, EngineResult};

pub const MAX_TIER: u8 = 5;

/// Tier-scaled question factory. Every question is constructed so the
/// answer is exact: division builds the dividend from divisor × quotient,
/// roots start from a perfect power, and percentages only pair rates with
/// bases that divide evenly.
pub struct QuestionGenerator {
    params: GeneratorParams,
    rng: StdRng,
    recent: HashMap<Operation, VecDeque<Vec<i64>>>,
}

impl QuestionGenerator {
    pub fn new(params: GeneratorParams) -> Self {
        Self {
            params,
            rng: StdRng::from_os_rng(),
            recent: HashMap::new(),
        }
    }

    pub fn with_seed(params: GeneratorParams, seed: u64) -> Self {
        Self {
            params,
            rng: StdRng::seed_from_u64(seed),
            recent: HashMap::new(),
        }
    }

    /// Produces one question at the given tier, avoiding the last few
    /// operand tuples for the operation. `with_choices` additionally fills
    /// a shuffled multiple-choice option list.
    pub fn generate(
        &mut self,
        operation: Operation,
        tier: u8,
        with_choices: bool,
    ) -> EngineResult<Question> {
        let tier = tier.min(MAX_TIER);
        let (operands, answer) = self.pick_operands(operation, tier)?;
        let choices = if with_choices {
            Some(self.choice_options(answer))
        } else {
            None
        };
        Ok(Question {
            id: uuid::Uuid::new_v4().to_string(),
            operation,
            operands: operands.clone(),
            correct_answer: answer,
            tier,
            prompt: render_prompt(operation, &operands),
            choices,
            created_at: chrono::Utc::now().timestamp_millis(),
        })
    }

    fn pick_operands(&mut self, operation: Operation, tier: u8) -> EngineResult<(Vec<f64>, f64)> {
        let mut repeated = None;
        for _ in 0..self.params.max_retries {
            let Some((operands, answer)) = self.candidate(operation, tier) else {
                continue;
            };
            let key = repetition_key(&operands);
            if self.window(operation).contains(&key) {
                repeated = Some((operands, answer));
                continue;
            }
            self.remember(operation, key);
            return Ok((operands, answer));
        }
        // Tiny tier-0 ranges can spend every retry on recent repeats; a
        // repeat still beats failing the session.
        if let Some((operands, answer)) = repeated {
            tracing::warn!(
                operation = operation.as_str(),
                tier,
                "repetition window relaxed after exhausting retries"
            );
            self.remember(operation, repetition_key(&operands));
            return Ok((operands, answer));
        }
        Err(EngineError::Generation(format!(
            "no viable operands for {} at tier {}",
            operation.as_str(),
            tier
        )))
    }

    fn candidate(&mut self, operation: Operation, tier: u8) -> Option<(Vec<f64>, f64)> {
        let t = tier as usize;
        match operation {
            Operation::Add => {
                let hi = [9, 20, 50, 100, 500, 999][t];
                if tier == MAX_TIER {
                    let a = self.rng.random_range(10..=hi);
                    let b = self.rng.random_range(10..=hi);
                    let c = self.rng.random_range(10..=hi);
                    Some((
                        vec![a as f64, b as f64, c as f64],
                        (a + b + c) as f64,
                    ))
                } else {
                    let a = self.rng.random_range(1..=hi);
                    let b = self.rng.random_range(1..=hi);
                    Some((vec![a as f64, b as f64], (a + b) as f64))
                }
            }
            Operation::Subtract => {
                let hi = [9, 20, 50, 100, 500, 999][t];
                let a = self.rng.random_range(1..=hi);
                let b = self.rng.random_range(1..=hi);
                let (a, b) = if a >= b { (a, b) } else { (b, a) };
                if a == b {
                    return None;
                }
                Some((vec![a as f64, b as f64], (a - b) as f64))
            }
            Operation::Multiply => {
                let hi = [5, 9, 12, 15, 25, 40][t];
                let a = self.rng.random_range(2..=hi);
                let b = self.rng.random_range(2..=hi);
                Some((vec![a as f64, b as f64], (a * b) as f64))
            }
            Operation::Divide => {
                let divisor_hi = [5, 9, 12, 12, 15, 20][t];
                let quotient_hi = [5, 9, 12, 15, 20, 30][t];
                let divisor = self.rng.random_range(2..=divisor_hi);
                let quotient = self.rng.random_range(2..=quotient_hi);
                let dividend = divisor * quotient;
                Some((vec![dividend as f64, divisor as f64], quotient as f64))
            }
            Operation::Power => {
                let base_hi = [3, 4, 5, 7, 9, 12][t];
                let exp_hi: u32 = [2, 2, 2, 3, 3, 3][t];
                let base: i64 = self.rng.random_range(2..=base_hi);
                let exp = self.rng.random_range(2..=exp_hi);
                let answer = base.pow(exp);
                if answer > 10_000 {
                    return None;
                }
                Some((vec![base as f64, exp as f64], answer as f64))
            }
            Operation::Root => {
                let base_hi = [5, 7, 10, 12, 15, 20][t];
                let degree: u32 = if tier >= 3 && self.rng.random::<f64>() < 0.4 {
                    3
                } else {
                    2
                };
                let base: i64 = self.rng.random_range(2..=base_hi);
                let radicand = base.pow(degree);
                Some((vec![radicand as f64, degree as f64], base as f64))
            }
            Operation::Percent => {
                if tier == MAX_TIER {
                    // Half-percent rates stay exact against bases
                    // divisible by 40: 2.5k% of 40m = k·m.
                    let k = self.rng.random_range(1..=8);
                    let m = self.rng.random_range(1..=25);
                    let pct = 2.5 * k as f64;
                    let base = (40 * m) as f64;
                    Some((vec![pct, base], pct * base / 100.0))
                } else {
                    let rates: &[i64] = if tier <= 2 {
                        &[10, 20, 25, 50]
                    } else {
                        &[5, 10, 15, 20, 25, 30, 40, 50, 60, 75, 80]
                    };
                    let pct = rates[self.rng.random_range(0..rates.len())];
                    let k_hi = [5, 10, 15, 20, 25, 25][t];
                    let base = 20 * self.rng.random_range(1..=k_hi);
                    Some((
                        vec![pct as f64, base as f64],
                        (pct * base) as f64 / 100.0,
                    ))
                }
            }
        }
    }

    /// Four options including the answer; distractors are near-misses at
    /// a distance scaled to the answer's magnitude.
    fn choice_options(&mut self, answer: f64) -> Vec<f64> {
        let count = self.params.choice_count.max(2);
        let spread = ((answer.abs() * 0.15).round() as i64).max(2);
        let mut options = vec![answer];
        let mut widen = 0i64;
        while options.len() < count {
            let delta = self.rng.random_range(1..=spread + widen);
            let sign = if self.rng.random::<f64>() < 0.5 { -1 } else { 1 };
            let candidate = answer + (sign * delta) as f64;
            if candidate < 0.0 && answer >= 0.0 {
                widen += 1;
                continue;
            }
            if options.iter().any(|o| (o - candidate).abs() < 1e-9) {
                widen += 1;
                continue;
            }
            options.push(candidate);
        }
        // Fisher-Yates so the answer position carries no signal.
        for i in (1..options.len()).rev() {
            let j = self.rng.random_range(0..=i);
            options.swap(i, j);
        }
        options
    }

    fn window(&mut self, operation: Operation) -> &mut VecDeque<Vec<i64>> {
        self.recent.entry(operation).or_default()
    }

    fn remember(&mut self, operation: Operation, key: Vec<i64>) {
        let cap = self.params.repetition_window;
        let window = self.window(operation);
        window.push_back(key);
        while window.len() > cap {
            window.pop_front();
        }
    }
}

fn repetition_key(operands: &[f64]) -> Vec<i64> {
    operands.iter().map(|v| (v * 100.0).round() as i64).collect()
}

pub fn render_prompt(operation: Operation, operands: &[f64]) -> String {
    let n = |i: usize| format_number(operands.get(i).copied().unwrap_or(0.0));
    match operation {
        Operation::Add => {
            let parts: Vec<String> = operands.iter().map(|v| format_number(*v)).collect();
            format!("{} = ?", parts.join(" + "))
        }
        Operation::Subtract => format!("{} - {} = ?", n(0), n(1)),
        Operation::Multiply => format!("{} × {} = ?", n(0), n(1)),
        Operation::Divide => format!("{} ÷ {} = ?", n(0), n(1)),
        Operation::Power => format!("{}^{} = ?", n(0), n(1)),
        Operation::Root => {
            if operands.get(1).copied().unwrap_or(2.0) == 3.0 {
                format!("∛{} = ?", n(0))
            } else {
                format!("√{} = ?", n(0))
            }
        }
        Operation::Percent => format!("{}% of {} = ?", n(0), n(1)),
    }
}

/// Mental-math nudge for a question; operand-aware where a trick applies.
pub fn render_hint(operation: Operation, operands: &[f64]) -> String {
    match operation {
        Operation::Add => "Add the largest place values first, then the rest.".to_string(),
        Operation::Subtract => {
            "Subtract in steps: take the tens away, then adjust by the ones.".to_string()
        }
        Operation::Multiply => {
            let b = operands.get(1).copied().unwrap_or(0.0);
            if b >= 9.0 {
                format!(
                    "Split the second factor: ×{} is ×{} minus ×{}.",
                    format_number(b),
                    format_number((b / 10.0).ceil() * 10.0),
                    format_number((b / 10.0).ceil() * 10.0 - b)
                )
            } else {
                "Break one factor into tens and ones, multiply each, then add.".to_string()
            }
        }
        Operation::Divide => "Recall the matching multiplication table row.".to_string(),
        Operation::Power => "Multiply the base by itself one step at a time.".to_string(),
        Operation::Root => {
            if operands.get(1).copied().unwrap_or(2.0) == 3.0 {
                "Which number multiplied by itself twice more gives this?".to_string()
            } else {
                "Which number times itself gives this?".to_string()
            }
        }
        Operation::Percent => "Find 10% first by shifting the decimal, then scale.".to_string(),
    }
}

pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
