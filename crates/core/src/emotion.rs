use crate::error::DeviceError;
use crate::model::{EmotionSample, EmotionVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Weight kept from the previous smoothed value on every new sample.
const RETAIN: f64 = 0.9;
/// Below this intensity the dominant emotion is not worth commenting on.
const BALANCED_THRESHOLD: f64 = 0.15;

/// An external facial-expression detector. While started, it pushes one
/// [`EmotionVector`] per sampling interval to the channel given to the session.
pub trait EmotionDetector: Send {
    fn start(&mut self) -> Result<(), DeviceError>;
    fn stop(&mut self);
}

/// Whole-session mean intensities. `NoData` when nothing was sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum EmotionSummary {
    NoData,
    Mean(EmotionVector),
}

impl EmotionSummary {
    pub fn dominant(&self) -> Option<(&str, f64)> {
        match self {
            EmotionSummary::NoData => None,
            EmotionSummary::Mean(values) => values
                .iter()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(label, value)| (label.as_str(), *value)),
        }
    }

    /// One-line coaching remark about the dominant expression.
    pub fn feedback(&self) -> Option<&'static str> {
        let (label, value) = self.dominant()?;
        if value < BALANCED_THRESHOLD {
            return Some("Your expressions were quite balanced throughout the interview.");
        }
        Some(match label {
            "happy" => "You appeared confident and positive during the interview, which is excellent!",
            "neutral" => "You maintained a professional, composed demeanor throughout the interview.",
            "surprise" => "You showed engagement and interest in the interview questions.",
            "sad" => "You may have appeared somewhat downcast. Try to maintain more positive expressions.",
            "fear" => "You showed signs of nervousness. Practice more to build confidence.",
            "disgust" => "Some of your expressions appeared negative. Work on maintaining a neutral or positive demeanor.",
            "angry" => "You displayed tension at times. Try relaxation techniques before interviews.",
            _ => "Your expressions were quite balanced throughout the interview.",
        })
    }
}

/// Keeps two views over the same sample stream: an exponential moving average
/// for live display and a plain mean over the full history for the report.
#[derive(Debug, Default, Clone)]
pub struct EmotionAggregator {
    history: Vec<EmotionSample>,
    smoothed: EmotionVector,
    per_question: BTreeMap<usize, EmotionVector>,
}

impl EmotionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sample. Timestamps never go backwards: an offset earlier than
    /// the last sample is pinned to it.
    pub fn record(
        &mut self,
        offset: Duration,
        question_index: Option<usize>,
        vector: EmotionVector,
    ) -> &EmotionSample {
        let vector: EmotionVector = vector
            .into_iter()
            .filter(|(_, value)| value.is_finite())
            .map(|(label, value)| (label, value.clamp(0.0, 1.0)))
            .collect();

        let last = self.history.last().map_or(0, |s| s.timestamp_ms);
        let timestamp_ms = (offset.as_millis() as u64).max(last);

        for (label, value) in &vector {
            self.smoothed
                .entry(label.clone())
                .and_modify(|smoothed| *smoothed = *smoothed * RETAIN + value * (1.0 - RETAIN))
                .or_insert(*value);
        }
        if let Some(index) = question_index {
            self.per_question.insert(index, self.smoothed.clone());
        }

        self.history.push(EmotionSample {
            timestamp_ms,
            question_index,
            vector,
        });
        &self.history[self.history.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn live(&self) -> &EmotionVector {
        &self.smoothed
    }

    pub fn timeline(&self) -> &[EmotionSample] {
        &self.history
    }

    pub fn per_question(&self) -> &BTreeMap<usize, EmotionVector> {
        &self.per_question
    }

    /// Per-label mean over every sample that reported the label.
    pub fn final_mean(&self) -> EmotionSummary {
        if self.history.is_empty() {
            return EmotionSummary::NoData;
        }
        let mut totals: BTreeMap<&str, (f64, u32)> = BTreeMap::new();
        for sample in &self.history {
            for (label, value) in &sample.vector {
                let entry = totals.entry(label.as_str()).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
        }
        if totals.is_empty() {
            return EmotionSummary::NoData;
        }
        EmotionSummary::Mean(
            totals
                .into_iter()
                .map(|(label, (sum, count))| (label.to_string(), sum / f64::from(count)))
                .collect(),
        )
    }
}
