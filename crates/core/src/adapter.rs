//! The only door to the generative service.
//!
//! Every call returns a `'static` boxed future so the session can park it in
//! its single pending-call slot and keep handling input while it runs. No call
//! made through here can fail from the session's point of view: generation
//! and scoring always produce content, falling back to the static banks and a
//! neutral judgement, and report the underlying [`ServiceError`] alongside.

use crate::bank;
use crate::error::ServiceError;
use crate::extract::{first_json_array, first_json_object};
use crate::generative::{GenerationRequest, GenerativeModel};
use crate::model::{ConnectionState, ConnectionStatus, InterviewSetup, QuestionOrigin};
use crate::prompts::{PromptSet, render};
use futures::FutureExt;
use futures::future::BoxFuture;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const NEUTRAL_SCORE: u8 = 5;
pub const SHORT_CIRCUIT_SCORE: u8 = 2;
pub const MIN_ANSWER_CHARS: usize = 15;

const DEFAULT_FEEDBACK: &str = "Thank you for your response.";
const DEFAULT_CHALLENGE: &str = "Could you elaborate more on your answer?";
const FALLBACK_LINE: &str = "I'm not sure that answer fully addresses the question. Could you think about it from another angle and try again?";

const DISMISSIVE: &[&str] = &["i don't know", "i have no idea", "no idea", "idk"];

const CORRECTIVE: &[&str] = &[
    "That's not the type of answer I'd expect in a real interview. Could you try to provide a more thoughtful response?",
    "In an actual interview, saying 'I don't know' without attempting to answer would be a red flag. Let's try to work through this question.",
    "I understand this might be challenging, but in a real interview, you should attempt to reason through the problem even if you're uncertain.",
    "That response wouldn't impress an interviewer. Would you like to try again with a more detailed answer?",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Applied to every request, not only the probe.
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Excellent,
    Good,
    Average,
    Poor,
}

impl Quality {
    fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "excellent" => Some(Quality::Excellent),
            "good" => Some(Quality::Good),
            "average" => Some(Quality::Average),
            "poor" => Some(Quality::Poor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JudgementSource {
    Model,
    ShortCircuit,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgement {
    pub score: u8,
    pub feedback: String,
    pub follow_up: Option<String>,
    pub quality: Option<Quality>,
    pub source: JudgementSource,
}

impl Judgement {
    fn fallback() -> Self {
        Self {
            score: NEUTRAL_SCORE,
            feedback: FALLBACK_LINE.to_string(),
            follow_up: None,
            quality: None,
            source: JudgementSource::Fallback,
        }
    }

    fn short_circuit(question_index: usize) -> Self {
        Self {
            score: SHORT_CIRCUIT_SCORE,
            feedback: CORRECTIVE[question_index % CORRECTIVE.len()].to_string(),
            follow_up: None,
            quality: Some(Quality::Poor),
            source: JudgementSource::ShortCircuit,
        }
    }

    /// The line the interviewer says back: feedback, then the challenge.
    pub fn spoken(&self) -> String {
        match &self.follow_up {
            Some(challenge) => format!("{} {}", self.feedback, challenge),
            None => self.feedback.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    pub judgement: Judgement,
    /// Set when the judgement is a fallback caused by a failed call.
    pub error: Option<ServiceError>,
}

pub enum ScoreCall {
    /// Decided locally, no request was made.
    Immediate(ScoreOutcome),
    Pending(BoxFuture<'static, ScoreOutcome>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedQuestion {
    pub text: String,
    pub origin: QuestionOrigin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionPlan {
    pub questions: Vec<PlannedQuestion>,
    pub error: Option<ServiceError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeVerdict {
    Connected,
    RetryAfter(Duration),
    Failed(ServiceError),
}

pub struct AiServiceAdapter {
    model: Arc<dyn GenerativeModel>,
    credential: SecretString,
    prompts: Arc<PromptSet>,
    probe: ProbeSettings,
    connection: ConnectionState,
    attempt: u32,
    offline: bool,
}

impl AiServiceAdapter {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        credential: Option<SecretString>,
        prompts: PromptSet,
        probe: ProbeSettings,
    ) -> Self {
        Self {
            model,
            credential: credential.unwrap_or_else(|| SecretString::from("")),
            prompts: Arc::new(prompts),
            probe,
            connection: ConnectionState::default(),
            attempt: 0,
            offline: false,
        }
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Content-only mode: no request is made and every answer uses fallbacks.
    pub fn set_offline(&mut self, offline: bool) {
        if offline {
            tracing::warn!("AI service disabled, continuing with prepared content");
        }
        self.offline = offline;
    }

    /// The only way to change the credential after construction.
    pub fn set_credential(&mut self, credential: SecretString) {
        self.credential = credential;
        self.connection = ConnectionState::default();
        self.attempt = 0;
        tracing::info!("Credential updated");
    }

    /// First attempt of a new probe sequence.
    pub fn start_probe(&mut self) -> BoxFuture<'static, Result<(), ServiceError>> {
        self.attempt = 0;
        self.connection.retry_count = 0;
        self.next_probe_attempt()
    }

    pub fn next_probe_attempt(&mut self) -> BoxFuture<'static, Result<(), ServiceError>> {
        self.attempt += 1;
        self.connection.status = ConnectionStatus::Connecting;
        tracing::info!("Probing AI service (attempt {}/{})", self.attempt, self.probe.max_attempts);

        let model = Arc::clone(&self.model);
        let credential = self.credential.clone();
        let request = GenerationRequest::new(self.prompts.probe.clone());
        let timeout = self.probe.timeout;
        async move {
            let reply = call(model, credential, request, timeout).await?;
            if reply.trim().is_empty() {
                return Err(ServiceError::Parse("empty probe reply".to_string()));
            }
            Ok(())
        }
        .boxed()
    }

    pub fn on_probe_result(&mut self, result: Result<(), ServiceError>) -> ProbeVerdict {
        match result {
            Ok(()) => {
                tracing::info!("AI service reachable");
                self.record_outcome(None);
                ProbeVerdict::Connected
            }
            Err(e) if e.is_retryable() && self.attempt < self.probe.max_attempts => {
                tracing::warn!(
                    "Probe attempt {} failed: {}. Retrying in {:?}",
                    self.attempt,
                    e,
                    self.probe.retry_delay
                );
                self.connection.retry_count = self.attempt;
                self.connection.last_error_kind = Some(e.kind());
                ProbeVerdict::RetryAfter(self.probe.retry_delay)
            }
            Err(e) => {
                tracing::warn!("AI service unreachable after {} attempt(s): {}", self.attempt, e);
                self.record_outcome(Some(&e));
                ProbeVerdict::Failed(e)
            }
        }
    }

    /// Folds the result of any call into the connection state.
    pub fn record_outcome(&mut self, error: Option<&ServiceError>) {
        match error {
            None => {
                self.connection.status = ConnectionStatus::Connected;
                self.connection.last_error_kind = None;
            }
            Some(e) => {
                self.connection.status = ConnectionStatus::Error;
                self.connection.last_error_kind = Some(e.kind());
            }
        }
    }

    pub fn generate_questions(
        &self,
        setup: &InterviewSetup,
        count: usize,
    ) -> BoxFuture<'static, QuestionPlan> {
        let setup = setup.clone();
        if self.offline {
            return futures::future::ready(QuestionPlan {
                questions: build_plan(&setup, Vec::new(), count),
                error: None,
            })
            .boxed();
        }

        let prompt = render(
            &self.prompts.generate_questions,
            &[
                ("company", &setup.company),
                ("role", &setup.role),
                ("interview_type", setup.interview_type.label()),
                ("count", &count.to_string()),
            ],
        );
        let model = Arc::clone(&self.model);
        let credential = self.credential.clone();
        let timeout = self.probe.timeout;
        async move {
            let (generated, error) =
                match call(model, credential, GenerationRequest::new(prompt), timeout).await {
                    Ok(reply) => {
                        tracing::debug!("Question generation reply: {}", reply);
                        match parse_questions(&reply) {
                            Some(list) => (list, None),
                            None => (
                                Vec::new(),
                                Some(ServiceError::Parse("no question list in reply".to_string())),
                            ),
                        }
                    }
                    Err(e) => (Vec::new(), Some(e)),
                };
            if let Some(e) = &error {
                tracing::warn!("Question generation failed, using question bank: {}", e);
            }
            QuestionPlan {
                questions: build_plan(&setup, generated, count),
                error,
            }
        }
        .boxed()
    }

    pub fn score_response(
        &self,
        setup: &InterviewSetup,
        question_index: usize,
        question: &str,
        transcript: &str,
    ) -> ScoreCall {
        if is_low_effort(transcript) {
            tracing::info!("Low-effort answer to question {}, scoring locally", question_index);
            return ScoreCall::Immediate(ScoreOutcome {
                judgement: Judgement::short_circuit(question_index),
                error: None,
            });
        }
        if self.offline {
            return ScoreCall::Immediate(ScoreOutcome {
                judgement: Judgement::fallback(),
                error: None,
            });
        }

        let prompt = render(
            &self.prompts.score_response,
            &[
                ("company", &setup.company),
                ("role", &setup.role),
                ("interview_type", setup.interview_type.label()),
                ("question", question),
                ("response", transcript),
            ],
        );
        let model = Arc::clone(&self.model);
        let credential = self.credential.clone();
        let timeout = self.probe.timeout;
        ScoreCall::Pending(
            async move {
                let request = GenerationRequest::new(prompt);
                let error = match call(model, credential, request, timeout).await {
                    Ok(reply) => {
                        tracing::debug!("Scoring reply: {}", reply);
                        match parse_judgement(&reply) {
                            Some(judgement) => return ScoreOutcome { judgement, error: None },
                            None => ServiceError::Parse("no judgement object in reply".to_string()),
                        }
                    }
                    Err(e) => e,
                };
                tracing::warn!("Scoring failed, using neutral score: {}", error);
                ScoreOutcome {
                    judgement: Judgement::fallback(),
                    error: Some(error),
                }
            }
            .boxed(),
        )
    }
}

async fn call(
    model: Arc<dyn GenerativeModel>,
    credential: SecretString,
    request: GenerationRequest,
    timeout: Duration,
) -> Result<String, ServiceError> {
    match tokio::time::timeout(timeout, model.generate(&credential, &request)).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::Timeout(timeout)),
    }
}

pub fn is_low_effort(transcript: &str) -> bool {
    let normalized = transcript.trim().to_lowercase().replace('\u{2019}', "'");
    normalized.is_empty()
        || DISMISSIVE.contains(&normalized.as_str())
        || normalized.chars().count() < MIN_ANSWER_CHARS
}

/// Accepts an array of strings or of objects carrying a `question` field.
pub fn parse_questions(reply: &str) -> Option<Vec<String>> {
    let Value::Array(items) = first_json_array(reply)? else {
        return None;
    };
    let questions: Vec<String> = items
        .iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(text.as_str()),
            Value::Object(fields) => fields.get("question").and_then(Value::as_str),
            _ => None,
        })
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .collect();
    (!questions.is_empty()).then_some(questions)
}

pub fn parse_judgement(reply: &str) -> Option<Judgement> {
    let Value::Object(fields) = first_json_object(reply)? else {
        return None;
    };

    let score = match fields.get("score") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|s| s.is_finite())
    .map_or(NEUTRAL_SCORE, |s| s.round().clamp(1.0, 10.0) as u8);

    let text = |key: &str| {
        fields
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Some(Judgement {
        score,
        feedback: text("feedback").unwrap_or_else(|| DEFAULT_FEEDBACK.to_string()),
        follow_up: Some(text("challenge").unwrap_or_else(|| DEFAULT_CHALLENGE.to_string())),
        quality: fields.get("quality").and_then(Value::as_str).and_then(Quality::parse),
        source: JudgementSource::Model,
    })
}

/// Generated questions first. A short or empty list is topped up from the
/// static pools, skipping duplicates.
pub fn build_plan(
    setup: &InterviewSetup,
    generated: Vec<String>,
    count: usize,
) -> Vec<PlannedQuestion> {
    let mut plan: Vec<PlannedQuestion> = Vec::with_capacity(count);
    let push = |text: &str, origin: QuestionOrigin, plan: &mut Vec<PlannedQuestion>| {
        if plan.len() < count && !plan.iter().any(|q| q.text.eq_ignore_ascii_case(text)) {
            plan.push(PlannedQuestion {
                text: text.to_string(),
                origin,
            });
        }
    };

    for text in &generated {
        push(text, QuestionOrigin::Generated, &mut plan);
    }

    let selection = bank::select(setup);
    let company = bank::company_questions(&setup.company);
    let pools: [&[&str]; 3] = if generated.is_empty() {
        [selection.questions, company, bank::GENERIC_DEFAULT]
    } else {
        [company, selection.questions, bank::GENERIC_DEFAULT]
    };
    for text in pools.into_iter().flatten() {
        push(text, QuestionOrigin::StaticFallback, &mut plan);
    }
    plan
}
