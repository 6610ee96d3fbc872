use crate::emotion::{EmotionAggregator, EmotionSummary};
use crate::model::{EmotionSample, EmotionVector, Question, ScoreRecord, Session};
use crate::scoring::{PerformanceSummary, ScoreAggregator};
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything the report consumer gets once the session completes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub session: Session,
    pub questions: Vec<Question>,
    pub overall_score: Option<f64>,
    pub per_question_scores: Vec<ScoreRecord>,
    pub emotion_mean: EmotionSummary,
    pub emotion_timeline: Vec<EmotionSample>,
    pub per_question_emotions: BTreeMap<usize, EmotionVector>,
    pub transcripts: BTreeMap<usize, String>,
    pub performance: PerformanceSummary,
    pub emotion_feedback: Option<String>,
}

impl SessionReport {
    pub fn build(
        session: &Session,
        questions: &[Question],
        scores: &ScoreAggregator,
        emotions: &EmotionAggregator,
        transcripts: &BTreeMap<usize, String>,
    ) -> Self {
        let overall_score = scores.overall();
        let emotion_mean = emotions.final_mean();
        let emotion_feedback = emotion_mean.feedback().map(str::to_string);
        Self {
            session: session.clone(),
            questions: questions.to_vec(),
            overall_score,
            per_question_scores: scores.breakdown(),
            emotion_mean,
            emotion_timeline: emotions.timeline().to_vec(),
            per_question_emotions: emotions.per_question().clone(),
            transcripts: transcripts.clone(),
            performance: PerformanceSummary::from_overall(overall_score),
            emotion_feedback,
        }
    }
}
