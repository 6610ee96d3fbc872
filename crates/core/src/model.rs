use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    ConnectingService,
    Ready,
    QuestionPresenting,
    AwaitingResponse,
    Scoring,
    AdvancingQuestion,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::ConnectingService => "connecting_service",
            SessionStatus::Ready => "ready",
            SessionStatus::QuestionPresenting => "question_presenting",
            SessionStatus::AwaitingResponse => "awaiting_response",
            SessionStatus::Scoring => "scoring",
            SessionStatus::AdvancingQuestion => "advancing_question",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
        }
    }

    /// True while a question is current.
    pub fn has_current_question(self) -> bool {
        matches!(
            self,
            SessionStatus::QuestionPresenting
                | SessionStatus::AwaitingResponse
                | SessionStatus::Scoring
                | SessionStatus::AdvancingQuestion
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewType {
    Technical,
    Behavioral,
    SystemDesign,
    Business,
    Marketing,
    Finance,
    Other(String),
}

impl InterviewType {
    /// Lenient parse: "System Design", "system-design" and "system_design" all
    /// name the same interview type. Unknown labels are kept verbatim.
    pub fn parse(label: &str) -> Self {
        let normalized = label.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "technical" => InterviewType::Technical,
            "behavioral" | "behavioural" => InterviewType::Behavioral,
            "system_design" => InterviewType::SystemDesign,
            "business" => InterviewType::Business,
            "marketing" => InterviewType::Marketing,
            "finance" => InterviewType::Finance,
            _ => InterviewType::Other(label.trim().to_string()),
        }
    }

    /// Human wording used in prompts and spoken lines.
    pub fn label(&self) -> &str {
        match self {
            InterviewType::Technical => "technical",
            InterviewType::Behavioral => "behavioral",
            InterviewType::SystemDesign => "system design",
            InterviewType::Business => "business",
            InterviewType::Marketing => "marketing",
            InterviewType::Finance => "finance",
            InterviewType::Other(label) => label,
        }
    }
}

/// What the candidate is rehearsing for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewSetup {
    pub company: String,
    pub role: String,
    pub interview_type: InterviewType,
}

impl InterviewSetup {
    pub fn new(
        company: impl Into<String>,
        role: impl Into<String>,
        interview_type: InterviewType,
    ) -> Self {
        Self {
            company: company.into(),
            role: role.into(),
            interview_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub status: SessionStatus,
    #[serde(flatten)]
    pub setup: InterviewSetup,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: u64,
    /// Zero until the question plan is fixed; never changes afterwards.
    pub total_questions: usize,
}

impl Session {
    pub fn new(setup: InterviewSetup) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: SessionStatus::Idle,
            setup,
            started_at: None,
            elapsed_seconds: 0,
            total_questions: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionOrigin {
    Generated,
    StaticFallback,
}

/// A question as it was put to the candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub index: usize,
    pub text: String,
    pub origin: QuestionOrigin,
    pub presented_at: DateTime<Utc>,
}

/// The answer accumulator for the current question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseRecord {
    pub question_index: usize,
    transcript: String,
    frozen: bool,
}

impl ResponseRecord {
    pub fn new(question_index: usize) -> Self {
        Self {
            question_index,
            transcript: String::new(),
            frozen: false,
        }
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Appends a final speech fragment. Ignored once frozen.
    pub fn append(&mut self, fragment: &str) {
        let fragment = fragment.trim();
        if self.frozen || fragment.is_empty() {
            return;
        }
        if !self.transcript.is_empty() {
            self.transcript.push(' ');
        }
        self.transcript.push_str(fragment);
    }

    /// Replaces the buffer with typed text. Ignored once frozen.
    pub fn replace(&mut self, text: &str) {
        if !self.frozen {
            self.transcript = text.to_string();
        }
    }

    pub fn freeze(&mut self) -> String {
        self.frozen = true;
        self.transcript.trim().to_string()
    }

    pub fn clear(&mut self) {
        self.transcript.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub question_index: usize,
    pub score: u8,
    pub feedback_text: String,
}

/// Label to intensity map produced by the facial-expression detector.
pub type EmotionVector = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionSample {
    /// Milliseconds since the session started.
    pub timestamp_ms: u64,
    pub question_index: Option<usize>,
    pub vector: EmotionVector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub last_error_kind: Option<ErrorKind>,
    pub retry_count: u32,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            last_error_kind: None,
            retry_count: 0,
        }
    }
}
