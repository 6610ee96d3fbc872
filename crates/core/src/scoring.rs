use crate::model::ScoreRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 10;

/// Per-question scores, one live record per question index.
#[derive(Debug, Default, Clone)]
pub struct ScoreAggregator {
    records: BTreeMap<usize, ScoreRecord>,
}

impl ScoreAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a score, replacing any earlier score for the same question.
    pub fn record(
        &mut self,
        question_index: usize,
        score: u8,
        feedback_text: impl Into<String>,
    ) -> &ScoreRecord {
        let record = ScoreRecord {
            question_index,
            score: score.clamp(MIN_SCORE, MAX_SCORE),
            feedback_text: feedback_text.into(),
        };
        if self.records.insert(question_index, record).is_some() {
            tracing::debug!("Score for question {} overwritten", question_index);
        }
        &self.records[&question_index]
    }

    pub fn get(&self, question_index: usize) -> Option<&ScoreRecord> {
        self.records.get(&question_index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Mean of all recorded scores, `None` before the first one.
    pub fn overall(&self) -> Option<f64> {
        if self.records.is_empty() {
            return None;
        }
        let total: u32 = self.records.values().map(|r| u32::from(r.score)).sum();
        Some(f64::from(total) / self.records.len() as f64)
    }

    pub fn breakdown(&self) -> Vec<ScoreRecord> {
        self.records.values().cloned().collect()
    }
}

/// Three coaching sentences derived from the overall score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub communication: String,
    pub technical: String,
    pub problem_solving: String,
}

impl PerformanceSummary {
    pub fn from_overall(overall: Option<f64>) -> Self {
        let overall = overall.unwrap_or(0.0);
        let (communication, technical, problem_solving) = if overall >= 8.0 {
            (
                "Excellent communication skills with clear and concise responses.",
                "Strong technical knowledge demonstrated across questions.",
                "Great problem-solving approach with structured thinking.",
            )
        } else if overall >= 6.0 {
            (
                "Good communication with room for more structured answers.",
                "Solid technical foundation with some areas to deepen.",
                "Reasonable problem-solving; try to explain trade-offs more explicitly.",
            )
        } else {
            (
                "Work on giving clearer, more complete answers.",
                "Review the core concepts for this role before your next interview.",
                "Practice breaking problems down step by step out loud.",
            )
        };
        Self {
            communication: communication.to_string(),
            technical: technical.to_string(),
            problem_solving: problem_solving.to_string(),
        }
    }
}
