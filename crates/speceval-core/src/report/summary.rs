//! Aggregate statistics over a run's records.

use crate::model::{FinalStatus, ScoreRecord};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub total_cases: usize,
    pub mean_score: f64,
    pub median_score: f64,
    pub min_score: f64,
    pub max_score: f64,
    /// Sample standard deviation; needs at least two records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_deviation: Option<f64>,
    pub completed: usize,
    pub timed_out: usize,
    pub failed: usize,
    pub provider: String,
    pub model: String,
}

impl SummaryStats {
    /// `None` for an empty run.
    pub fn from_records(records: &[ScoreRecord]) -> Option<Self> {
        let first = records.first()?;
        let n = records.len();

        let mut scores: Vec<f64> = records.iter().map(|r| r.score).collect();
        scores.sort_by(f64::total_cmp);

        let mean = scores.iter().sum::<f64>() / n as f64;
        let median = if n % 2 == 1 {
            scores[n / 2]
        } else {
            (scores[n / 2 - 1] + scores[n / 2]) / 2.0
        };
        let std_deviation = (n >= 2).then(|| {
            let var = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            var.sqrt()
        });
        let count = |status: FinalStatus| records.iter().filter(|r| r.status == status).count();

        Some(Self {
            total_cases: n,
            mean_score: mean,
            median_score: median,
            min_score: scores[0],
            max_score: scores[n - 1],
            std_deviation,
            completed: count(FinalStatus::Completed),
            timed_out: count(FinalStatus::TimedOut),
            failed: count(FinalStatus::Failed),
            provider: first.provider.clone(),
            model: first.model.clone(),
        })
    }
}
