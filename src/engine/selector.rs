use std::collections::BTreeMap;
use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SelectorParams;
use crate::engine::generator::QuestionGenerator;
use crate::engine::types::{Attempt, Operation, PracticeQueue, Question, SkillRecord};
use crate::error::EngineResult;

/// Candidate key: operation plus a digit-count bucket of the largest
/// operand, so near-identical failures collapse into one weight.
type TemplateKey = (Operation, u8);

/// Builds practice queues from attempt history. History is append-only,
/// which lets the slow pool replay each operation's EMA to recover the
/// expectation every attempt was measured against.
pub struct PracticeSelector {
    params: SelectorParams,
    rng: StdRng,
}

impl PracticeSelector {
    pub fn new(params: SelectorParams) -> Self {
        Self {
            params,
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn with_seed(params: SelectorParams, seed: u64) -> Self {
        Self {
            params,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform pick for normal-mode question flow.
    pub fn random_operation(&mut self, operations: &[Operation]) -> Option<Operation> {
        if operations.is_empty() {
            return None;
        }
        Some(operations[self.rng.random_range(0..operations.len())])
    }

    /// Round-robin queue over explicitly chosen operations.
    pub fn targeted(
        &mut self,
        operations: &[Operation],
        skills: &BTreeMap<Operation, SkillRecord>,
        generator: &mut QuestionGenerator,
        with_choices: bool,
    ) -> EngineResult<PracticeQueue> {
        let mut questions = Vec::with_capacity(self.params.queue_size);
        if operations.is_empty() {
            return Ok(PracticeQueue {
                questions,
                degraded: true,
            });
        }
        for i in 0..self.params.queue_size {
            let operation = operations[i % operations.len()];
            questions.push(generator.generate(operation, tier_of(skills, operation), with_choices)?);
        }
        Ok(PracticeQueue {
            questions,
            degraded: false,
        })
    }

    /// Queue biased toward operations the learner recently got wrong.
    pub fn mistakes(
        &mut self,
        attempts: &[&Attempt],
        enabled: &[Operation],
        skills: &BTreeMap<Operation, SkillRecord>,
        generator: &mut QuestionGenerator,
        with_choices: bool,
    ) -> EngineResult<PracticeQueue> {
        let candidates = self.weighted_candidates(attempts, enabled, |_, attempt| !attempt.correct);
        self.build_queue(candidates, enabled, skills, generator, with_choices)
    }

    /// Queue biased toward operations answered much slower than the EMA
    /// response time held at the moment of each attempt.
    pub fn slow(
        &mut self,
        attempts: &[&Attempt],
        enabled: &[Operation],
        skills: &BTreeMap<Operation, SkillRecord>,
        generator: &mut QuestionGenerator,
        alpha: f64,
        baseline_ms: f64,
        with_choices: bool,
    ) -> EngineResult<PracticeQueue> {
        let slow_factor = self.params.slow_factor;
        // weighted_candidates walks history in chronological order, so the
        // replay map always holds the EMA the attempt was measured against.
        let candidates = self.weighted_candidates(attempts, enabled, |replay_ema, attempt| {
            let ema = replay_ema
                .entry(attempt.operation)
                .or_insert(baseline_ms);
            let rt = attempt.response_time_ms.max(1) as f64;
            let was_slow = rt > slow_factor * *ema;
            *ema = alpha * rt + (1.0 - alpha) * *ema;
            was_slow
        });
        self.build_queue(candidates, enabled, skills, generator, with_choices)
    }

    /// Walks history oldest-first applying `is_candidate`, then weights
    /// each surviving template by recency-decayed frequency.
    fn weighted_candidates<F>(
        &self,
        attempts: &[&Attempt],
        enabled: &[Operation],
        mut is_candidate: F,
    ) -> Vec<(TemplateKey, f64)>
    where
        F: FnMut(&mut HashMap<Operation, f64>, &Attempt) -> bool,
    {
        let mut replay: HashMap<Operation, f64> = HashMap::new();
        let total = attempts.len();
        let mut weights: HashMap<TemplateKey, f64> = HashMap::new();
        for (index, attempt) in attempts.iter().enumerate() {
            let selected = is_candidate(&mut replay, attempt);
            if !selected || !enabled.contains(&attempt.operation) {
                continue;
            }
            let age = (total - 1 - index) as i32;
            let weight = self.params.recency_decay.powi(age);
            *weights
                .entry((attempt.operation, digit_bucket(&attempt.operands)))
                .or_insert(0.0) += weight;
        }
        let mut candidates: Vec<(TemplateKey, f64)> = weights.into_iter().collect();
        candidates.sort_by(|a, b| a.0.cmp(&b.0));
        candidates
    }

    fn build_queue(
        &mut self,
        candidates: Vec<(TemplateKey, f64)>,
        enabled: &[Operation],
        skills: &BTreeMap<Operation, SkillRecord>,
        generator: &mut QuestionGenerator,
        with_choices: bool,
    ) -> EngineResult<PracticeQueue> {
        if candidates.is_empty() {
            let mut queue = self.targeted(enabled, skills, generator, with_choices)?;
            queue.degraded = true;
            return Ok(queue);
        }

        let mut questions = Vec::with_capacity(self.params.queue_size);
        let mut pool = candidates.clone();
        while questions.len() < self.params.queue_size {
            if pool.is_empty() {
                // Pool smaller than the queue: start another weighted
                // pass rather than padding with untargeted questions.
                pool = candidates.clone();
            }
            let picked = self.sample_weighted(&mut pool);
            let (operation, _) = picked;
            questions.push(generator.generate(
                operation,
                tier_of(skills, operation),
                with_choices,
            )?);
        }
        diversify(&mut questions);
        Ok(PracticeQueue {
            questions,
            degraded: false,
        })
    }

    /// Removes and returns one key, probability proportional to weight.
    fn sample_weighted(&mut self, pool: &mut Vec<(TemplateKey, f64)>) -> TemplateKey {
        let total: f64 = pool.iter().map(|(_, w)| w).sum();
        let mut remaining = self.rng.random::<f64>() * total;
        let mut index = pool.len() - 1;
        for (i, (_, weight)) in pool.iter().enumerate() {
            if remaining < *weight {
                index = i;
                break;
            }
            remaining -= *weight;
        }
        pool.remove(index).0
    }
}

fn tier_of(skills: &BTreeMap<Operation, SkillRecord>, operation: Operation) -> u8 {
    skills.get(&operation).map(|s| s.tier).unwrap_or_default()
}

fn digit_bucket(operands: &[f64]) -> u8 {
    let largest = operands
        .iter()
        .map(|v| v.abs())
        .fold(0.0_f64, f64::max)
        .round() as i64;
    largest.max(0).to_string().len() as u8
}

/// No two adjacent questions share an operation unless the queue only
/// contains one.
fn diversify(questions: &mut [Question]) {
    for i in 1..questions.len() {
        if questions[i].operation != questions[i - 1].operation {
            continue;
        }
        if let Some(j) =
            (i + 1..questions.len()).find(|&j| questions[j].operation != questions[i - 1].operation)
        {
            questions.swap(i, j);
        }
    }
}
