use serde::Serialize;

use crate::config::TrendParams;
use crate::engine::types::{Operation, Session};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedValue {
    pub slope: f64,
    pub intercept: f64,
    /// Fitted value one session past the window.
    pub next: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendProjection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    pub accuracy: Option<ProjectedValue>,
    pub avg_time_ms: Option<ProjectedValue>,
    /// Sessions the fit was computed over.
    pub window: usize,
    /// Always true: a linear fit over a handful of sessions is a hint,
    /// not a forecast.
    pub speculative: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Prediction {
    /// Fewer than two usable sessions; never a fabricated number.
    InsufficientData { sessions: usize },
    Projection(TrendProjection),
}

/// Linear extrapolation over recent session aggregates.
#[derive(Debug, Clone)]
pub struct TrendPredictor {
    params: TrendParams,
}

impl TrendPredictor {
    pub fn new(params: TrendParams) -> Self {
        Self { params }
    }

    /// Projection over the last `window_size` closed sessions; scoped to
    /// one operation when given, otherwise over whole-session summaries.
    pub fn predict(&self, sessions: &[Session], operation: Option<Operation>) -> Prediction {
        let points = self.session_points(sessions, operation);
        if points.len() < 2 {
            return Prediction::InsufficientData {
                sessions: points.len(),
            };
        }

        let accuracy_series: Vec<f64> = points.iter().map(|p| p.0).collect();
        let time_series: Vec<f64> = points.iter().map(|p| p.1).collect();

        let accuracy = fit(&accuracy_series).map(|(slope, intercept)| ProjectedValue {
            slope,
            intercept,
            next: (intercept + slope * (accuracy_series.len() + 1) as f64).clamp(0.0, 1.0),
        });
        let avg_time_ms = fit(&time_series).map(|(slope, intercept)| ProjectedValue {
            slope,
            intercept,
            next: (intercept + slope * (time_series.len() + 1) as f64)
                .max(self.params.min_time_ms),
        });

        Prediction::Projection(TrendProjection {
            operation,
            accuracy,
            avg_time_ms,
            window: points.len(),
            speculative: true,
        })
    }

    /// (accuracy, avg time) per closed session, oldest first, trimmed to
    /// the window. Sessions without a matching attempt are skipped for
    /// per-operation series.
    fn session_points(
        &self,
        sessions: &[Session],
        operation: Option<Operation>,
    ) -> Vec<(f64, f64)> {
        let mut points: Vec<(f64, f64)> = sessions
            .iter()
            .filter(|s| s.end_time.is_some())
            .filter_map(|session| match operation {
                None => session
                    .summary
                    .as_ref()
                    .map(|summary| (summary.accuracy.clamp(0.0, 1.0), summary.avg_time_ms)),
                Some(op) => {
                    let attempts: Vec<_> = session
                        .attempts
                        .iter()
                        .filter(|a| a.operation == op)
                        .collect();
                    if attempts.is_empty() {
                        return None;
                    }
                    let correct = attempts.iter().filter(|a| a.correct).count();
                    let total_time: i64 =
                        attempts.iter().map(|a| a.response_time_ms.max(0)).sum();
                    Some((
                        correct as f64 / attempts.len() as f64,
                        total_time as f64 / attempts.len() as f64,
                    ))
                }
            })
            .collect();
        if points.len() > self.params.window_size {
            points.drain(..points.len() - self.params.window_size);
        }
        points
    }
}

/// Least-squares line through (1, y1)..(n, yn). None for degenerate input.
fn fit(values: &[f64]) -> Option<(f64, f64)> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let n_f = n as f64;
    let sum_x: f64 = (1..=n).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values
        .iter()
        .enumerate()
        .map(|(i, y)| (i + 1) as f64 * y)
        .sum();
    let sum_x2: f64 = (1..=n).map(|i| (i as f64) * (i as f64)).sum();

    let denominator = n_f * sum_x2 - sum_x * sum_x;
    if denominator.abs() < f64::EPSILON {
        return None;
    }
    let slope = (n_f * sum_xy - sum_x * sum_y) / denominator;
    let intercept = (sum_y - slope * sum_x) / n_f;
    Some((slope, intercept))
}
