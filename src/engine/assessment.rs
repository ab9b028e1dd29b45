use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::generator::QuestionGenerator;
use crate::engine::skill::SkillModel;
use crate::engine::types::{Operation, Question, SkillRecord};
use crate::error::{EngineError, EngineResult};

/// Calibration questions asked per enabled operation.
pub const QUESTIONS_PER_OPERATION: usize = 2;
/// Calibration runs one notch above the easiest tier.
pub const CALIBRATION_TIER: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentAnswer {
    pub question_id: String,
    pub value: f64,
    pub response_time_ms: i64,
}

#[derive(Debug, Clone)]
pub struct AssessmentOutcome {
    pub overall_accuracy: f64,
    pub seeds: BTreeMap<Operation, SkillRecord>,
}

/// One short measured sequence instead of a self-rating: the learner
/// answers a couple of easy questions per operation and the results seed
/// the skill records.
pub fn calibration_questions(
    generator: &mut QuestionGenerator,
    enabled: &[Operation],
) -> EngineResult<Vec<Question>> {
    let mut questions = Vec::with_capacity(enabled.len() * QUESTIONS_PER_OPERATION);
    for operation in enabled {
        for _ in 0..QUESTIONS_PER_OPERATION {
            questions.push(generator.generate(*operation, CALIBRATION_TIER, false)?);
        }
    }
    Ok(questions)
}

pub fn grade(
    questions: &[Question],
    answers: &[AssessmentAnswer],
    model: &SkillModel,
) -> EngineResult<AssessmentOutcome> {
    let mut per_operation: BTreeMap<Operation, (usize, usize, i64)> = BTreeMap::new();
    let mut correct_total = 0usize;

    for question in questions {
        let answer = answers
            .iter()
            .find(|a| a.question_id == question.id)
            .ok_or_else(|| {
                EngineError::Validation(format!("unanswered calibration question {}", question.id))
            })?;
        let correct = (answer.value - question.correct_answer).abs() < 1e-6;
        if correct {
            correct_total += 1;
        }
        let entry = per_operation.entry(question.operation).or_insert((0, 0, 0));
        entry.0 += 1;
        if correct {
            entry.1 += 1;
        }
        entry.2 += answer.response_time_ms.max(1);
    }

    if questions.is_empty() {
        return Err(EngineError::Validation(
            "calibration run had no questions".to_string(),
        ));
    }

    let seeds = per_operation
        .into_iter()
        .map(|(operation, (asked, correct, total_time))| {
            let accuracy = correct as f64 / asked as f64;
            let avg_rt = total_time as f64 / asked as f64;
            (operation, model.seed_from_calibration(accuracy, avg_rt))
        })
        .collect();

    Ok(AssessmentOutcome {
        overall_accuracy: correct_total as f64 / questions.len() as f64,
        seeds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GeneratorParams, SkillParams};

    #[test]
    fn calibration_asks_two_questions_per_operation() {
        let mut generator = QuestionGenerator::with_seed(GeneratorParams::default(), 3);
        let enabled = vec![Operation::Add, Operation::Divide];
        let questions = calibration_questions(&mut generator, &enabled).unwrap();
        assert_eq!(questions.len(), 4);
        assert!(questions.iter().all(|q| q.tier == CALIBRATION_TIER));
    }

    #[test]
    fn grading_seeds_each_operation() {
        let mut generator = QuestionGenerator::with_seed(GeneratorParams::default(), 3);
        let model = SkillModel::new(SkillParams::default());
        let enabled = vec![Operation::Add, Operation::Multiply];
        let questions = calibration_questions(&mut generator, &enabled).unwrap();
        let answers: Vec<AssessmentAnswer> = questions
            .iter()
            .enumerate()
            .map(|(i, q)| AssessmentAnswer {
                question_id: q.id.clone(),
                // miss every other question
                value: if i % 2 == 0 { q.correct_answer } else { q.correct_answer + 1.0 },
                response_time_ms: 2000,
            })
            .collect();
        let outcome = grade(&questions, &answers, &model).unwrap();
        assert!((outcome.overall_accuracy - 0.5).abs() < 1e-12);
        assert_eq!(outcome.seeds.len(), 2);
        for seed in outcome.seeds.values() {
            assert_eq!(seed.attempt_count, 0);
            assert!(seed.ema_accuracy > 0.0 && seed.ema_accuracy < 1.0);
        }
    }

    #[test]
    fn missing_answers_are_rejected() {
        let mut generator = QuestionGenerator::with_seed(GeneratorParams::default(), 3);
        let model = SkillModel::new(SkillParams::default());
        let questions = calibration_questions(&mut generator, &[Operation::Add]).unwrap();
        let err = grade(&questions, &[], &model).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn perfect_run_seeds_above_neutral() {
        let mut generator = QuestionGenerator::with_seed(GeneratorParams::default(), 3);
        let model = SkillModel::new(SkillParams::default());
        let questions = calibration_questions(&mut generator, &[Operation::Subtract]).unwrap();
        let answers: Vec<AssessmentAnswer> = questions
            .iter()
            .map(|q| AssessmentAnswer {
                question_id: q.id.clone(),
                value: q.correct_answer,
                response_time_ms: 1500,
            })
            .collect();
        let outcome = grade(&questions, &answers, &model).unwrap();
        assert_eq!(outcome.overall_accuracy, 1.0);
        let seed = &outcome.seeds[&Operation::Subtract];
        assert!(seed.ema_accuracy > 0.5);
        assert!(seed.tier >= 2);
    }
}
