//! The interview session state machine.
//!
//! [`SessionController`] owns every collaborator and is driven by a single
//! loop ([`SessionController::run`], or [`SessionController::step`] one input
//! at a time). Each turn of the loop waits on a `tokio::select!` over user
//! actions, capture signals, synthesis end events, emotion samples, the media
//! request, the probe retry timer and the one pending AI call. Handlers are
//! plain synchronous methods, so no state is ever touched across an await.

use crate::adapter::{
    AiServiceAdapter, Judgement, PlannedQuestion, ProbeVerdict, QuestionPlan, ScoreCall,
    ScoreOutcome,
};
use crate::capture::{CaptureSettings, CaptureSignal, RecognitionEvent, Recognizer, SpeechCapture};
use crate::config::{MAX_TOTAL_QUESTIONS, SessionConfig};
use crate::debounce::Debounce;
use crate::emotion::{EmotionAggregator, EmotionDetector};
use crate::error::{DeviceError, ErrorKind, ServiceError, SessionError};
use crate::generative::GenerativeModel;
use crate::media::{MediaDevices, MediaRequest, MediaStream, TrackKind};
use crate::model::{
    ConnectionState, EmotionVector, InterviewSetup, Question, ResponseRecord, ScoreRecord,
    Session, SessionStatus,
};
use crate::recv_or_pending;
use crate::report::SessionReport;
use crate::scoring::ScoreAggregator;
use crate::speech_output::{SpeakOutcome, SpeechOutput, SynthesisEvent, Synthesizer, UtteranceId};
use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use secrecy::SecretString;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

const CLOSING_LINE: &str =
    "That concludes our interview. Thank you for your time, your report is ready.";
const NO_SPEECH_NOTICE: &str =
    "No speech detected. You can type your answer or start listening again.";

#[derive(Debug, Clone)]
pub enum UserAction {
    Start,
    RetryConnection,
    SetCredential(SecretString),
    ProceedOffline,
    StartListening,
    StopListening,
    SetResponseText(String),
    Submit,
    NextQuestion,
    ToggleMicrophone,
    ToggleCamera,
    SetVoiceMuted(bool),
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: Option<ErrorKind>,
    pub message: String,
    /// The user can act on this with [`UserAction::RetryConnection`].
    pub retry_available: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StatusChanged {
        from: SessionStatus,
        to: SessionStatus,
    },
    InterviewerLine(String),
    QuestionPresented(Question),
    ListeningChanged(bool),
    InterimTranscript(String),
    TranscriptUpdated(String),
    ScoreRecorded {
        record: ScoreRecord,
        judgement: Judgement,
    },
    LiveEmotion(EmotionVector),
    Notice(Notice),
    Completed(Box<SessionReport>),
}

enum PendingCall {
    Probe {
        background: bool,
        call: BoxFuture<'static, Result<(), ServiceError>>,
    },
    Questions(BoxFuture<'static, QuestionPlan>),
    Scoring {
        question_index: usize,
        call: BoxFuture<'static, ScoreOutcome>,
    },
}

impl PendingCall {
    fn label(&self) -> &'static str {
        match self {
            PendingCall::Probe { .. } => "connectivity probe",
            PendingCall::Questions(_) => "question generation",
            PendingCall::Scoring { .. } => "scoring request",
        }
    }
}

enum Completion {
    Probe {
        background: bool,
        result: Result<(), ServiceError>,
    },
    Questions(QuestionPlan),
    Scored {
        question_index: usize,
        outcome: ScoreOutcome,
    },
}

type MediaCall = BoxFuture<'static, Result<Box<dyn MediaStream>, DeviceError>>;

enum Input {
    Action(Option<UserAction>),
    Capture(CaptureSignal),
    Spoken(UtteranceId),
    Emotion(Option<EmotionVector>),
    Call(Completion),
    Media(Result<Box<dyn MediaStream>, DeviceError>),
    RetryDue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    Natural,
    Explicit,
}

async fn wait_pending(slot: &mut Option<PendingCall>) -> Completion {
    match slot {
        Some(PendingCall::Probe { background, call }) => {
            let background = *background;
            Completion::Probe {
                background,
                result: call.await,
            }
        }
        Some(PendingCall::Questions(call)) => Completion::Questions(call.await),
        Some(PendingCall::Scoring {
            question_index,
            call,
        }) => {
            let question_index = *question_index;
            Completion::Scored {
                question_index,
                outcome: call.await,
            }
        }
        None => std::future::pending().await,
    }
}

async fn wait_media(slot: &mut Option<MediaCall>) -> Result<Box<dyn MediaStream>, DeviceError> {
    match slot {
        Some(call) => call.await,
        None => std::future::pending().await,
    }
}

pub struct SessionController {
    session: Session,
    adapter: AiServiceAdapter,
    capture_settings: CaptureSettings,
    capture: SpeechCapture,
    output: SpeechOutput,
    emotions: EmotionAggregator,
    emotion_detector: Option<Box<dyn EmotionDetector>>,
    emotion_rx: Option<mpsc::UnboundedReceiver<EmotionVector>>,
    sampling: bool,
    scores: ScoreAggregator,
    media: Option<Arc<dyn MediaDevices>>,
    media_pending: Option<MediaCall>,
    stream: Option<Box<dyn MediaStream>>,
    mic_enabled: bool,
    camera_enabled: bool,
    question_limit: usize,
    auto_listen: bool,
    plan: Vec<PlannedQuestion>,
    questions: Vec<Question>,
    response: ResponseRecord,
    transcripts: BTreeMap<usize, String>,
    pending: Option<PendingCall>,
    retry: Debounce,
    awaiting_utterance: Option<UtteranceId>,
    clock: Option<Instant>,
    advisories: HashSet<(ErrorKind, &'static str)>,
    subscribers: Vec<mpsc::UnboundedSender<SessionEvent>>,
    report: Option<SessionReport>,
}

impl SessionController {
    pub fn new(
        setup: InterviewSetup,
        config: SessionConfig,
        model: Arc<dyn GenerativeModel>,
    ) -> Self {
        let mut adapter = AiServiceAdapter::new(
            model,
            config.credential,
            config.prompts,
            config.probe,
        );
        if config.offline {
            adapter.set_offline(true);
        }
        Self {
            session: Session::new(setup),
            adapter,
            capture_settings: config.capture,
            capture: SpeechCapture::unavailable(config.capture),
            output: SpeechOutput::unavailable(),
            emotions: EmotionAggregator::new(),
            emotion_detector: None,
            emotion_rx: None,
            sampling: false,
            scores: ScoreAggregator::new(),
            media: None,
            media_pending: None,
            stream: None,
            mic_enabled: true,
            camera_enabled: true,
            question_limit: config.total_questions.clamp(1, MAX_TOTAL_QUESTIONS),
            auto_listen: config.auto_listen,
            plan: Vec::new(),
            questions: Vec::new(),
            response: ResponseRecord::default(),
            transcripts: BTreeMap::new(),
            pending: None,
            retry: Debounce::new(config.probe.retry_delay),
            awaiting_utterance: None,
            clock: None,
            advisories: HashSet::new(),
            subscribers: Vec::new(),
            report: None,
        }
    }

    pub fn with_recognizer(
        mut self,
        recognizer: Box<dyn Recognizer>,
        events: mpsc::UnboundedReceiver<RecognitionEvent>,
    ) -> Self {
        self.capture = SpeechCapture::new(recognizer, events, self.capture_settings);
        self
    }

    pub fn with_synthesizer(
        mut self,
        synthesizer: Box<dyn Synthesizer>,
        events: mpsc::UnboundedReceiver<SynthesisEvent>,
    ) -> Self {
        self.output = SpeechOutput::new(synthesizer, events);
        self
    }

    pub fn with_media(mut self, devices: Arc<dyn MediaDevices>) -> Self {
        self.media = Some(devices);
        self
    }

    pub fn with_emotion_detector(
        mut self,
        detector: Box<dyn EmotionDetector>,
        samples: mpsc::UnboundedReceiver<EmotionVector>,
    ) -> Self {
        self.emotion_detector = Some(detector);
        self.emotion_rx = Some(samples);
        self
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    /// The session record. The elapsed time runs from `Start` and freezes
    /// at completion.
    pub fn session(&self) -> Session {
        let mut session = self.session.clone();
        if session.status != SessionStatus::Completed {
            session.elapsed_seconds = self.elapsed_seconds();
        }
        session
    }

    fn elapsed_seconds(&self) -> u64 {
        self.clock.map_or(0, |c| c.elapsed().as_secs())
    }

    pub fn connection(&self) -> &ConnectionState {
        self.adapter.connection()
    }

    pub fn current_question(&self) -> Option<&Question> {
        if self.session.status.has_current_question() {
            self.questions.last()
        } else {
            None
        }
    }

    pub fn response(&self) -> &ResponseRecord {
        &self.response
    }

    pub fn scores(&self) -> &ScoreAggregator {
        &self.scores
    }

    pub fn emotions(&self) -> &EmotionAggregator {
        &self.emotions
    }

    pub fn is_listening(&self) -> bool {
        self.capture.is_active()
    }

    pub fn is_microphone_enabled(&self) -> bool {
        self.mic_enabled
    }

    pub fn is_camera_enabled(&self) -> bool {
        self.camera_enabled
    }

    pub fn report(&self) -> Option<&SessionReport> {
        self.report.as_ref()
    }

    /// Drives the session until it completes. A closed action channel ends
    /// the session as if the user had asked to.
    pub async fn run(mut self, mut actions: mpsc::Receiver<UserAction>) -> SessionReport {
        while self.step(&mut actions).await {}
        match self.report.take() {
            Some(report) => report,
            None => self.snapshot(),
        }
    }

    /// Waits for and handles exactly one input. Returns `false` once the
    /// session has completed.
    pub async fn step(&mut self, actions: &mut mpsc::Receiver<UserAction>) -> bool {
        if self.session.status == SessionStatus::Completed {
            return false;
        }
        let input = self.next_input(actions).await;
        self.handle_input(input);
        self.session.status != SessionStatus::Completed
    }

    async fn next_input(&mut self, actions: &mut mpsc::Receiver<UserAction>) -> Input {
        tokio::select! {
            action = actions.recv() => Input::Action(action),
            signal = self.capture.next_signal() => Input::Capture(signal),
            id = self.output.next_finished() => Input::Spoken(id),
            sample = recv_or_pending(&mut self.emotion_rx) => Input::Emotion(sample),
            done = wait_pending(&mut self.pending) => Input::Call(done),
            media = wait_media(&mut self.media_pending) => Input::Media(media),
            () = self.retry.fired() => Input::RetryDue,
        }
    }

    fn handle_input(&mut self, input: Input) {
        match input {
            Input::Action(Some(action)) => {
                if let Err(e) = self.dispatch(action) {
                    tracing::warn!("Action rejected: {}", e);
                    self.notice(Some(e.kind()), e.to_string(), false);
                }
            }
            Input::Action(None) => {
                tracing::info!("Action channel closed, ending session");
                self.finish(Ending::Explicit);
            }
            Input::Capture(signal) => self.on_capture_signal(signal),
            Input::Spoken(id) => self.on_utterance_finished(id),
            Input::Emotion(Some(vector)) => self.on_emotion_sample(vector),
            Input::Emotion(None) => {
                tracing::debug!("Emotion sample channel closed");
                self.emotion_rx = None;
            }
            Input::Call(done) => {
                self.pending = None;
                self.on_call_complete(done);
            }
            Input::Media(result) => {
                self.media_pending = None;
                self.on_media(result);
            }
            Input::RetryDue => self.on_retry_due(),
        }
    }

    /// Applies one user action. A rejected action leaves the session as it was.
    pub fn dispatch(&mut self, action: UserAction) -> Result<(), SessionError> {
        if self.session.status == SessionStatus::Completed {
            return Err(SessionError::Completed);
        }
        tracing::debug!("Action: {:?}", action);
        match action {
            UserAction::Start => self.start(),
            UserAction::RetryConnection => self.retry_connection(),
            UserAction::SetCredential(credential) => {
                self.adapter.set_credential(credential);
                if self.session.status == SessionStatus::Error {
                    self.begin_connecting();
                }
                Ok(())
            }
            UserAction::ProceedOffline => self.proceed_offline(),
            UserAction::StartListening => self.start_listening(),
            UserAction::StopListening => {
                self.stop_listening();
                Ok(())
            }
            UserAction::SetResponseText(text) => self.set_response_text(&text),
            UserAction::Submit => self.submit(),
            UserAction::NextQuestion => self.next_question(),
            UserAction::ToggleMicrophone => {
                self.toggle_microphone();
                Ok(())
            }
            UserAction::ToggleCamera => {
                self.toggle_camera();
                Ok(())
            }
            UserAction::SetVoiceMuted(muted) => {
                self.set_voice_muted(muted);
                Ok(())
            }
            UserAction::End => {
                self.finish(Ending::Explicit);
                Ok(())
            }
        }
    }

    // --- Connecting ---

    fn start(&mut self) -> Result<(), SessionError> {
        if self.session.status != SessionStatus::Idle {
            return Err(self.invalid("start the session"));
        }
        self.session.started_at = Some(Utc::now());
        self.clock = Some(Instant::now());
        tracing::info!(
            "Starting {} interview for {} at {}",
            self.session.setup.interview_type.label(),
            self.session.setup.role,
            self.session.setup.company
        );
        self.acquire_media();
        self.start_emotion_sampling();
        self.begin_connecting();
        Ok(())
    }

    fn begin_connecting(&mut self) {
        self.transition(SessionStatus::ConnectingService);
        self.retry.cancel();
        if self.adapter.is_offline() {
            self.on_connected();
            return;
        }
        self.pending = Some(PendingCall::Probe {
            background: false,
            call: self.adapter.start_probe(),
        });
    }

    fn retry_connection(&mut self) -> Result<(), SessionError> {
        match self.session.status {
            SessionStatus::Error => {
                self.begin_connecting();
                Ok(())
            }
            SessionStatus::Scoring => Err(SessionError::ScoringInFlight(self.current_index())),
            SessionStatus::QuestionPresenting
            | SessionStatus::AwaitingResponse
            | SessionStatus::AdvancingQuestion
                if self.pending.is_none() =>
            {
                // Mid-session: check the service in the background and go back
                // online if it answers.
                self.pending = Some(PendingCall::Probe {
                    background: true,
                    call: self.adapter.start_probe(),
                });
                Ok(())
            }
            _ => Err(self.invalid("retry the connection")),
        }
    }

    fn proceed_offline(&mut self) -> Result<(), SessionError> {
        if !matches!(
            self.session.status,
            SessionStatus::Error | SessionStatus::ConnectingService
        ) {
            return Err(self.invalid("proceed offline"));
        }
        self.adapter.set_offline(true);
        self.retry.cancel();
        if let Some(call) = self.pending.take() {
            tracing::debug!("Dropping {}", call.label());
        }
        self.on_connected();
        Ok(())
    }

    fn on_connected(&mut self) {
        self.transition(SessionStatus::Ready);
        self.pending = Some(PendingCall::Questions(
            self.adapter
                .generate_questions(&self.session.setup, self.question_limit),
        ));
    }

    fn on_retry_due(&mut self) {
        if self.session.status == SessionStatus::ConnectingService && self.pending.is_none() {
            self.pending = Some(PendingCall::Probe {
                background: false,
                call: self.adapter.next_probe_attempt(),
            });
        }
    }

    fn on_call_complete(&mut self, done: Completion) {
        match done {
            Completion::Probe {
                background: false,
                result,
            } => {
                if self.session.status != SessionStatus::ConnectingService {
                    return;
                }
                match self.adapter.on_probe_result(result) {
                    ProbeVerdict::Connected => self.on_connected(),
                    ProbeVerdict::RetryAfter(_) => self.retry.reset(),
                    ProbeVerdict::Failed(e) => {
                        self.transition(SessionStatus::Error);
                        let message = match e.kind() {
                            ErrorKind::Auth => format!(
                                "The AI service rejected the credential ({e}). Enter a new key, retry, or continue with prepared questions."
                            ),
                            _ => format!(
                                "Could not reach the AI service ({e}). Retry, or continue with prepared questions."
                            ),
                        };
                        self.notice(Some(e.kind()), message, true);
                    }
                }
            }
            Completion::Probe {
                background: true,
                result,
            } => match result {
                Ok(()) => {
                    self.adapter.record_outcome(None);
                    self.adapter.set_offline(false);
                    self.notice(None, "The AI service is reachable again.".to_string(), false);
                }
                Err(e) => self.report_service_error(&e, "The AI service is still unreachable"),
            },
            Completion::Questions(plan) => self.on_question_plan(plan),
            Completion::Scored {
                question_index,
                outcome,
            } => self.on_scored(question_index, outcome),
        }
    }

    // --- Questions ---

    fn on_question_plan(&mut self, plan: QuestionPlan) {
        if self.session.status != SessionStatus::Ready {
            return;
        }
        if let Some(e) = &plan.error {
            self.report_service_error(e, "Could not generate questions");
        } else if !self.adapter.is_offline() {
            self.adapter.record_outcome(None);
        }
        self.plan = plan.questions;
        self.session.total_questions = self.plan.len();
        tracing::info!("Question plan fixed at {} question(s)", self.plan.len());
        self.present(0);
    }

    fn greeting(&self) -> String {
        let setup = &self.session.setup;
        format!(
            "Hello, I'm your AI interviewer for your {} position at {}. I'll be asking you some {} questions. Let's begin with the first question.",
            setup.role,
            setup.company,
            setup.interview_type.label()
        )
    }

    fn present(&mut self, index: usize) {
        let Some(planned) = self.plan.get(index).cloned() else {
            self.finish(Ending::Natural);
            return;
        };
        let question = Question {
            index,
            text: planned.text,
            origin: planned.origin,
            presented_at: Utc::now(),
        };
        let line = if index == 0 {
            format!("{} {}", self.greeting(), question.text)
        } else {
            question.text.clone()
        };
        self.questions.push(question.clone());
        self.response = ResponseRecord::new(index);
        self.transition(SessionStatus::QuestionPresenting);
        self.publish(SessionEvent::QuestionPresented(question));
        if !self.speak(line) {
            self.open_response_window();
        }
    }

    fn current_index(&self) -> usize {
        self.questions.last().map_or(0, |q| q.index)
    }

    fn open_response_window(&mut self) {
        self.transition(SessionStatus::AwaitingResponse);
        if self.auto_listen && self.mic_enabled {
            self.begin_capture();
        }
    }

    /// The candidate started answering while the question was still being read.
    fn barge_in(&mut self) {
        if self.session.status == SessionStatus::QuestionPresenting {
            self.output.cancel();
            self.awaiting_utterance = None;
            self.open_response_window();
        }
    }

    fn require_answering(&self, action: &'static str) -> Result<(), SessionError> {
        match self.session.status {
            SessionStatus::QuestionPresenting | SessionStatus::AwaitingResponse => Ok(()),
            SessionStatus::Scoring => Err(SessionError::ScoringInFlight(self.current_index())),
            status => Err(SessionError::InvalidState { action, status }),
        }
    }

    // --- Answering ---

    fn start_listening(&mut self) -> Result<(), SessionError> {
        self.require_answering("start listening")?;
        if !self.mic_enabled {
            return Err(SessionError::MicrophoneMuted);
        }
        self.barge_in();
        self.begin_capture();
        Ok(())
    }

    fn begin_capture(&mut self) {
        match self.capture.start() {
            Ok(true) => self.publish(SessionEvent::ListeningChanged(true)),
            Ok(false) => {}
            Err(e) => self.advise_device(&e),
        }
    }

    fn stop_listening(&mut self) {
        if self.capture.stop() {
            self.publish(SessionEvent::ListeningChanged(false));
        }
    }

    fn set_response_text(&mut self, text: &str) -> Result<(), SessionError> {
        self.require_answering("edit the response")?;
        self.barge_in();
        self.response.replace(text);
        self.publish(SessionEvent::TranscriptUpdated(
            self.response.transcript().to_string(),
        ));
        Ok(())
    }

    fn submit(&mut self) -> Result<(), SessionError> {
        self.require_answering("submit a response")?;
        self.barge_in();
        self.stop_listening();

        let index = self.response.question_index;
        let transcript = self.response.freeze();
        let question = self
            .questions
            .last()
            .map(|q| q.text.clone())
            .unwrap_or_default();
        self.transcripts.insert(index, transcript.clone());
        self.transition(SessionStatus::Scoring);

        if let Some(call) = self.pending.take() {
            tracing::info!("Dropping {} to score question {}", call.label(), index);
        }
        match self
            .adapter
            .score_response(&self.session.setup, index, &question, &transcript)
        {
            ScoreCall::Immediate(outcome) => self.on_scored(index, outcome),
            ScoreCall::Pending(call) => {
                self.pending = Some(PendingCall::Scoring {
                    question_index: index,
                    call,
                });
            }
        }
        Ok(())
    }

    fn on_capture_signal(&mut self, signal: CaptureSignal) {
        match signal {
            CaptureSignal::Listening => {}
            CaptureSignal::Interim(text) => self.publish(SessionEvent::InterimTranscript(text)),
            CaptureSignal::Final(text) => {
                if matches!(
                    self.session.status,
                    SessionStatus::QuestionPresenting | SessionStatus::AwaitingResponse
                ) {
                    self.response.append(&text);
                    self.publish(SessionEvent::TranscriptUpdated(
                        self.response.transcript().to_string(),
                    ));
                }
            }
            CaptureSignal::Submit(_) => {
                self.publish(SessionEvent::ListeningChanged(false));
                if let Err(e) = self.submit() {
                    tracing::debug!("Ignoring auto-submit: {}", e);
                }
            }
            CaptureSignal::NoSpeech => {
                self.publish(SessionEvent::ListeningChanged(false));
                self.notice(None, NO_SPEECH_NOTICE.to_string(), false);
            }
            CaptureSignal::Degraded(e) => {
                self.publish(SessionEvent::ListeningChanged(false));
                self.advise_device(&e);
            }
            CaptureSignal::Failed(code) => {
                self.publish(SessionEvent::ListeningChanged(false));
                self.notice(
                    None,
                    format!("Speech recognition stopped ({code}). You can start listening again."),
                    false,
                );
            }
            CaptureSignal::Stopped => self.publish(SessionEvent::ListeningChanged(false)),
        }
    }

    // --- Scoring and advancing ---

    fn on_scored(&mut self, question_index: usize, outcome: ScoreOutcome) {
        if self.session.status != SessionStatus::Scoring || question_index != self.current_index() {
            tracing::debug!("Discarding stale judgement for question {}", question_index);
            return;
        }
        let ScoreOutcome { judgement, error } = outcome;
        if let Some(e) = &error {
            self.report_service_error(e, "Scoring failed");
        }

        let record = self
            .scores
            .record(question_index, judgement.score, judgement.feedback.clone())
            .clone();
        tracing::info!(
            "Question {} scored {} ({:?})",
            question_index,
            record.score,
            judgement.source
        );
        let spoken = judgement.spoken();
        self.publish(SessionEvent::ScoreRecorded { record, judgement });
        self.response.clear();
        self.transition(SessionStatus::AdvancingQuestion);
        if !self.speak(spoken) {
            self.advance();
        }
    }

    fn next_question(&mut self) -> Result<(), SessionError> {
        if self.session.status != SessionStatus::AdvancingQuestion {
            return Err(self.invalid("move to the next question"));
        }
        self.output.cancel();
        self.awaiting_utterance = None;
        self.advance();
        Ok(())
    }

    fn advance(&mut self) {
        let next = self.current_index() + 1;
        if next < self.session.total_questions {
            self.present(next);
        } else {
            self.speak(CLOSING_LINE.to_string());
            self.finish(Ending::Natural);
        }
    }

    // --- Speech output ---

    /// Publishes and speaks an interviewer line. Returns whether an utterance
    /// actually started, i.e. whether the caller should wait for its end.
    fn speak(&mut self, text: String) -> bool {
        let outcome = self.output.speak(&text);
        self.publish(SessionEvent::InterviewerLine(text));
        match outcome {
            SpeakOutcome::Started(id) => {
                self.awaiting_utterance = Some(id);
                true
            }
            SpeakOutcome::Muted => false,
            SpeakOutcome::Unavailable { first_notice } => {
                if first_notice {
                    self.advise(
                        ErrorKind::CapabilityMissing,
                        "speech synthesis",
                        "Speech output is not available. Interviewer lines are shown as text."
                            .to_string(),
                    );
                }
                false
            }
            SpeakOutcome::Failed(e) => {
                self.advise_device(&e);
                false
            }
        }
    }

    fn on_utterance_finished(&mut self, id: UtteranceId) {
        if self.awaiting_utterance != Some(id) {
            return;
        }
        self.awaiting_utterance = None;
        match self.session.status {
            SessionStatus::QuestionPresenting => self.open_response_window(),
            SessionStatus::AdvancingQuestion => self.advance(),
            _ => {}
        }
    }

    fn set_voice_muted(&mut self, muted: bool) {
        tracing::info!("Voice output {}", if muted { "muted" } else { "unmuted" });
        if let Some(id) = self.output.set_muted(muted) {
            // Nothing will report the end of a cancelled utterance.
            self.on_utterance_finished(id);
        }
    }

    // --- Devices ---

    fn acquire_media(&mut self) {
        if let Some(devices) = &self.media {
            let devices = Arc::clone(devices);
            let request = MediaRequest::default();
            self.media_pending = Some(async move { devices.open(request).await }.boxed());
        }
    }

    fn on_media(&mut self, result: Result<Box<dyn MediaStream>, DeviceError>) {
        match result {
            Ok(mut stream) => {
                if self.session.status == SessionStatus::Completed {
                    stream.stop();
                    return;
                }
                stream.set_track_enabled(TrackKind::Audio, self.mic_enabled);
                stream.set_track_enabled(TrackKind::Video, self.camera_enabled);
                tracing::info!("Media acquired with {} live track(s)", stream.live_tracks());
                self.stream = Some(stream);
            }
            Err(e) => self.advise_device(&e),
        }
    }

    fn toggle_microphone(&mut self) {
        self.mic_enabled = !self.mic_enabled;
        if let Some(stream) = self.stream.as_mut() {
            stream.set_track_enabled(TrackKind::Audio, self.mic_enabled);
        }
        if !self.mic_enabled {
            self.stop_listening();
        }
        tracing::info!("Microphone {}", if self.mic_enabled { "on" } else { "off" });
    }

    fn toggle_camera(&mut self) {
        self.camera_enabled = !self.camera_enabled;
        if let Some(stream) = self.stream.as_mut() {
            stream.set_track_enabled(TrackKind::Video, self.camera_enabled);
        }
        tracing::info!("Camera {}", if self.camera_enabled { "on" } else { "off" });
    }

    fn start_emotion_sampling(&mut self) {
        let Some(detector) = self.emotion_detector.as_mut() else {
            return;
        };
        match detector.start() {
            Ok(()) => self.sampling = true,
            Err(e) => self.advise_device(&e),
        }
    }

    fn on_emotion_sample(&mut self, vector: EmotionVector) {
        if !self.sampling {
            return;
        }
        let offset = self.clock.map(|c| c.elapsed()).unwrap_or_default();
        let question_index = self.current_question().map(|q| q.index);
        self.emotions.record(offset, question_index, vector);
        self.publish(SessionEvent::LiveEmotion(self.emotions.live().clone()));
    }

    /// Stops the detector and keeps whatever it had already delivered.
    fn stop_emotion_sampling(&mut self) {
        if self.sampling {
            if let Some(detector) = self.emotion_detector.as_mut() {
                detector.stop();
            }
        }
        if let Some(mut samples) = self.emotion_rx.take() {
            while let Ok(vector) = samples.try_recv() {
                self.on_emotion_sample(vector);
            }
        }
        self.sampling = false;
    }

    // --- Ending ---

    fn finish(&mut self, ending: Ending) {
        if self.session.status == SessionStatus::Completed {
            return;
        }
        self.stop_listening();
        if ending == Ending::Explicit {
            self.output.cancel();
        }
        self.awaiting_utterance = None;
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
        self.media_pending = None;
        self.stop_emotion_sampling();
        if let Some(call) = self.pending.take() {
            tracing::info!("Dropping {} on session end", call.label());
        }
        self.retry.cancel();

        self.session.elapsed_seconds = self.elapsed_seconds();
        self.transition(SessionStatus::Completed);
        let report = self.snapshot();
        tracing::info!(
            "Session {} completed: {} of {} question(s) scored",
            self.session.id,
            self.scores.len(),
            self.session.total_questions
        );
        self.publish(SessionEvent::Completed(Box::new(report.clone())));
        self.report = Some(report);
    }

    fn snapshot(&self) -> SessionReport {
        SessionReport::build(
            &self.session(),
            &self.questions,
            &self.scores,
            &self.emotions,
            &self.transcripts,
        )
    }

    // --- Publishing ---

    fn transition(&mut self, to: SessionStatus) {
        let from = self.session.status;
        if from == to {
            return;
        }
        self.session.status = to;
        tracing::info!("Session {}: {} -> {}", self.session.id, from, to);
        self.publish(SessionEvent::StatusChanged { from, to });
    }

    fn publish(&mut self, event: SessionEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn notice(&mut self, kind: Option<ErrorKind>, message: String, retry_available: bool) {
        self.publish(SessionEvent::Notice(Notice {
            kind,
            message,
            retry_available,
        }));
    }

    /// One-time notice per failure kind and source.
    fn advise(&mut self, kind: ErrorKind, source: &'static str, message: String) {
        if self.advisories.insert((kind, source)) {
            tracing::warn!("{}", message);
            self.notice(Some(kind), message, false);
        }
    }

    fn advise_device(&mut self, e: &DeviceError) {
        let message = match e.kind() {
            ErrorKind::PermissionDenied => format!(
                "Access to the {} was denied. You can type your answers instead.",
                e.device()
            ),
            _ => format!("{e}. You can type your answers instead."),
        };
        self.advise(e.kind(), e.device(), message);
    }

    fn report_service_error(&mut self, e: &ServiceError, context: &str) {
        match e.kind() {
            ErrorKind::Parse => {
                // The service answered, just not in the expected shape.
                tracing::warn!("{}: {}", context, e);
                self.adapter.record_outcome(None);
            }
            ErrorKind::CapabilityMissing => {
                self.adapter.record_outcome(Some(e));
                self.advise(
                    ErrorKind::CapabilityMissing,
                    "generative service",
                    format!("{context}: {e}. Continuing with prepared content."),
                );
            }
            kind => {
                self.adapter.record_outcome(Some(e));
                self.notice(
                    Some(kind),
                    format!("{context}: {e}. Continuing with prepared content."),
                    true,
                );
            }
        }
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidState {
            action,
            status: self.session.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::JudgementSource;
    use crate::emotion::EmotionSummary;
    use crate::generative::{GenerationRequest, MockGenerativeModel};
    use crate::model::{ConnectionStatus, InterviewType, QuestionOrigin};
    use crate::testing::{FakeEmotionDetector, FakeMedia, FakeRecognizer, FakeSynthesizer};
    use secrecy::ExposeSecret;
    use std::time::Duration;
    use tokio::time::{advance, timeout};

    const TWO_QUESTIONS: &str = r#"["Why do you want to work here?", "Describe a system you scaled."]"#;
    const GOOD_SCORE: &str = r#"{"score": 7, "feedback": "Well structured.", "quality": "good", "challenge": "What would you change?"}"#;
    const ANSWER: &str = "I led the migration of our billing service to a queue-based design.";

    fn is_probe(request: &GenerationRequest) -> bool {
        request.prompt.contains("single word")
    }

    fn is_generation(request: &GenerationRequest) -> bool {
        request.prompt.contains("interview questions")
    }

    fn scripted(questions: &'static str, score: &'static str) -> MockGenerativeModel {
        let mut model = MockGenerativeModel::new();
        model.expect_generate().returning(move |_, request| {
            if is_probe(request) {
                Ok("ready".to_string())
            } else if is_generation(request) {
                Ok(questions.to_string())
            } else {
                Ok(score.to_string())
            }
        });
        model
    }

    fn config(total_questions: usize) -> SessionConfig {
        SessionConfig {
            total_questions,
            credential: Some(SecretString::from("test-key")),
            ..SessionConfig::default()
        }
    }

    fn controller(model: MockGenerativeModel, total_questions: usize) -> SessionController {
        controller_with(model, config(total_questions))
    }

    fn controller_with(model: MockGenerativeModel, config: SessionConfig) -> SessionController {
        SessionController::new(
            InterviewSetup::new("Acme", "Backend Engineer", InterviewType::Technical),
            config,
            Arc::new(model),
        )
    }

    fn actions() -> (mpsc::Sender<UserAction>, mpsc::Receiver<UserAction>) {
        mpsc::channel(8)
    }

    /// Handles inputs until nothing is immediately ready.
    async fn settle(ctrl: &mut SessionController, rx: &mut mpsc::Receiver<UserAction>) {
        while let Ok(true) = timeout(Duration::from_millis(10), ctrl.step(rx)).await {}
    }

    fn drain(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    async fn answer(
        ctrl: &mut SessionController,
        rx: &mut mpsc::Receiver<UserAction>,
        text: &str,
    ) {
        ctrl.dispatch(UserAction::SetResponseText(text.to_string())).unwrap();
        ctrl.dispatch(UserAction::Submit).unwrap();
        settle(ctrl, rx).await;
    }

    #[tokio::test(start_paused = true)]
    async fn full_session_scores_every_question() {
        let mut ctrl = controller(scripted(TWO_QUESTIONS, GOOD_SCORE), 2);
        let mut events = ctrl.subscribe();
        let (_tx, mut rx) = actions();

        ctrl.dispatch(UserAction::Start).unwrap();
        settle(&mut ctrl, &mut rx).await;
        assert_eq!(ctrl.status(), SessionStatus::AwaitingResponse);
        assert_eq!(ctrl.session().total_questions, 2);
        assert_eq!(ctrl.connection().status, ConnectionStatus::Connected);
        let first = ctrl.current_question().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.origin, QuestionOrigin::Generated);

        answer(&mut ctrl, &mut rx, ANSWER).await;
        assert_eq!(ctrl.status(), SessionStatus::AwaitingResponse);
        assert_eq!(ctrl.current_question().unwrap().index, 1);

        answer(&mut ctrl, &mut rx, ANSWER).await;
        assert_eq!(ctrl.status(), SessionStatus::Completed);

        let report = ctrl.report().unwrap();
        assert_eq!(report.overall_score, Some(7.0));
        assert_eq!(report.questions.len(), 2);
        assert_eq!(report.transcripts[&1], ANSWER);
        assert_eq!(report.emotion_mean, EmotionSummary::NoData);

        let events = drain(&mut events);
        let lines: Vec<&String> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::InterviewerLine(line) => Some(line),
                _ => None,
            })
            .collect();
        assert!(lines[0]
            .starts_with("Hello, I'm your AI interviewer for your Backend Engineer position at Acme."));
        assert!(lines[0].ends_with("Why do you want to work here?"));
        assert_eq!(lines[1], "Well structured. What would you change?");
        assert_eq!(lines.last().unwrap().as_str(), CLOSING_LINE);
        assert!(matches!(events.last(), Some(SessionEvent::Completed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn run_returns_once_the_session_completes() {
        let mut ctrl = controller(scripted(TWO_QUESTIONS, GOOD_SCORE), 1);
        let mut events = ctrl.subscribe();
        let (tx, rx) = actions();
        let candidate = tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let SessionEvent::QuestionPresented(_) = event {
                    let _ = candidate.send(UserAction::SetResponseText(ANSWER.into())).await;
                    let _ = candidate.send(UserAction::Submit).await;
                }
            }
        });
        tx.send(UserAction::Start).await.unwrap();

        // The action sender stays open for the whole run.
        let report = timeout(Duration::from_secs(60), ctrl.run(rx))
            .await
            .expect("run should return after the last question");
        assert_eq!(report.session.status, SessionStatus::Completed);
        assert_eq!(report.overall_score, Some(7.0));
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_time_runs_until_completion() {
        let mut ctrl = controller(scripted(TWO_QUESTIONS, GOOD_SCORE), 2);
        let (_tx, mut rx) = actions();
        assert_eq!(ctrl.session().elapsed_seconds, 0);

        ctrl.dispatch(UserAction::Start).unwrap();
        settle(&mut ctrl, &mut rx).await;
        advance(Duration::from_secs(30)).await;
        assert_eq!(ctrl.session().elapsed_seconds, 30);

        ctrl.dispatch(UserAction::End).unwrap();
        advance(Duration::from_secs(10)).await;
        assert_eq!(ctrl.session().elapsed_seconds, 30);
        assert_eq!(ctrl.report().unwrap().session.elapsed_seconds, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn dismissive_answer_is_scored_without_a_request() {
        let mut model = MockGenerativeModel::new();
        // Probe and question generation only.
        model.expect_generate().times(2).returning(|_, request| {
            if is_probe(request) {
                Ok("ready".to_string())
            } else {
                Ok(TWO_QUESTIONS.to_string())
            }
        });
        let mut ctrl = controller(model, 2);
        let (_tx, mut rx) = actions();
        ctrl.dispatch(UserAction::Start).unwrap();
        settle(&mut ctrl, &mut rx).await;

        answer(&mut ctrl, &mut rx, "idk").await;

        let record = ctrl.scores().get(0).unwrap();
        assert_eq!(record.score, 2);
        assert!(record.feedback_text.contains("real interview"));
        assert_eq!(ctrl.current_question().unwrap().index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_while_scoring_is_rejected() {
        let mut ctrl = controller(scripted(TWO_QUESTIONS, GOOD_SCORE), 2);
        let (_tx, mut rx) = actions();
        ctrl.dispatch(UserAction::Start).unwrap();
        settle(&mut ctrl, &mut rx).await;

        ctrl.dispatch(UserAction::SetResponseText(ANSWER.to_string())).unwrap();
        ctrl.dispatch(UserAction::Submit).unwrap();
        assert_eq!(ctrl.status(), SessionStatus::Scoring);

        assert_eq!(
            ctrl.dispatch(UserAction::Submit),
            Err(SessionError::ScoringInFlight(0))
        );
        assert_eq!(
            ctrl.dispatch(UserAction::SetResponseText("changed my mind".into())),
            Err(SessionError::ScoringInFlight(0))
        );
        assert_eq!(ctrl.status(), SessionStatus::Scoring);
        assert!(matches!(ctrl.pending, Some(PendingCall::Scoring { question_index: 0, .. })));

        settle(&mut ctrl, &mut rx).await;
        assert_eq!(ctrl.scores().len(), 1);
        assert_eq!(ctrl.scores().get(0).unwrap().score, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn unparsable_generation_presents_a_fallback_question() {
        let mut ctrl = controller(scripted("Sure! Let's get started.", GOOD_SCORE), 5);
        let mut events = ctrl.subscribe();
        let (_tx, mut rx) = actions();

        ctrl.dispatch(UserAction::Start).unwrap();
        settle(&mut ctrl, &mut rx).await;

        let question = ctrl.current_question().unwrap();
        assert!(!question.text.is_empty());
        assert_eq!(question.origin, QuestionOrigin::StaticFallback);
        assert_eq!(ctrl.session().total_questions, 5);
        // A malformed reply is not a connectivity problem.
        assert_eq!(ctrl.connection().status, ConnectionStatus::Connected);
        assert!(!drain(&mut events).iter().any(|e| matches!(
            e,
            SessionEvent::Notice(Notice { retry_available: true, .. })
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn scoring_failure_records_a_neutral_score_and_offers_retry() {
        let mut model = MockGenerativeModel::new();
        model.expect_generate().returning(|_, request| {
            if is_probe(request) {
                Ok("ready".to_string())
            } else if is_generation(request) {
                Ok(TWO_QUESTIONS.to_string())
            } else {
                Err(ServiceError::Transport("503 Service Unavailable".to_string()))
            }
        });
        let mut ctrl = controller(model, 2);
        let mut events = ctrl.subscribe();
        let (_tx, mut rx) = actions();
        ctrl.dispatch(UserAction::Start).unwrap();
        settle(&mut ctrl, &mut rx).await;

        answer(&mut ctrl, &mut rx, ANSWER).await;

        assert_eq!(ctrl.scores().get(0).unwrap().score, 5);
        assert_eq!(ctrl.status(), SessionStatus::AwaitingResponse);
        assert_eq!(ctrl.connection().status, ConnectionStatus::Error);
        let events = drain(&mut events);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::ScoreRecorded { judgement, .. }
                if judgement.source == JudgementSource::Fallback
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Notice(Notice {
                kind: Some(ErrorKind::Transport),
                retry_available: true,
                ..
            })
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_retries_with_a_fixed_delay_then_errors() {
        let mut model = MockGenerativeModel::new();
        model
            .expect_generate()
            .times(3)
            .returning(|_, _| Err(ServiceError::Transport("connection refused".to_string())));
        let mut ctrl = controller(model, 2);
        let mut events = ctrl.subscribe();
        let (_tx, mut rx) = actions();

        ctrl.dispatch(UserAction::Start).unwrap();
        settle(&mut ctrl, &mut rx).await;
        assert_eq!(ctrl.status(), SessionStatus::ConnectingService);
        assert_eq!(ctrl.connection().retry_count, 1);

        advance(Duration::from_secs(2)).await;
        settle(&mut ctrl, &mut rx).await;
        assert_eq!(ctrl.status(), SessionStatus::ConnectingService);
        assert_eq!(ctrl.connection().retry_count, 2);

        advance(Duration::from_secs(2)).await;
        settle(&mut ctrl, &mut rx).await;
        assert_eq!(ctrl.status(), SessionStatus::Error);
        assert!(drain(&mut events).iter().any(|e| matches!(
            e,
            SessionEvent::Notice(Notice { retry_available: true, .. })
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn a_new_credential_lets_the_retry_succeed() {
        let mut model = MockGenerativeModel::new();
        model.expect_generate().returning(|credential, request| {
            if credential.expose_secret() != "good-key" {
                Err(ServiceError::Auth("API key not valid".to_string()))
            } else if is_probe(request) {
                Ok("ready".to_string())
            } else {
                Ok(TWO_QUESTIONS.to_string())
            }
        });
        let mut ctrl = controller(model, 2);
        let (_tx, mut rx) = actions();

        ctrl.dispatch(UserAction::Start).unwrap();
        settle(&mut ctrl, &mut rx).await;
        // Auth failures are not retried.
        assert_eq!(ctrl.status(), SessionStatus::Error);
        assert_eq!(ctrl.connection().last_error_kind, Some(ErrorKind::Auth));
        assert_eq!(ctrl.connection().retry_count, 0);

        ctrl.dispatch(UserAction::SetCredential(SecretString::from("good-key")))
            .unwrap();
        settle(&mut ctrl, &mut rx).await;
        assert_eq!(ctrl.status(), SessionStatus::AwaitingResponse);
        assert_eq!(ctrl.connection().status, ConnectionStatus::Connected);
        assert_eq!(
            ctrl.current_question().unwrap().origin,
            QuestionOrigin::Generated
        );
    }

    #[tokio::test(start_paused = true)]
    async fn proceeding_offline_uses_prepared_content() {
        let mut model = MockGenerativeModel::new();
        model
            .expect_generate()
            .times(1)
            .returning(|_, _| Err(ServiceError::Auth("missing API key".to_string())));
        let mut ctrl = controller(model, 3);
        let (_tx, mut rx) = actions();

        ctrl.dispatch(UserAction::Start).unwrap();
        settle(&mut ctrl, &mut rx).await;
        assert_eq!(ctrl.status(), SessionStatus::Error);

        ctrl.dispatch(UserAction::ProceedOffline).unwrap();
        settle(&mut ctrl, &mut rx).await;
        assert_eq!(ctrl.status(), SessionStatus::AwaitingResponse);
        assert_eq!(
            ctrl.current_question().unwrap().text,
            "Explain the concept of middleware in a backend framework."
        );

        answer(&mut ctrl, &mut rx, ANSWER).await;
        assert_eq!(ctrl.scores().get(0).unwrap().score, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn silence_auto_submits_the_spoken_answer() {
        let (speech_tx, speech_rx) = mpsc::unbounded_channel();
        let recognizer = FakeRecognizer::default();
        let mut ctrl = controller(scripted(TWO_QUESTIONS, GOOD_SCORE), 2)
            .with_recognizer(Box::new(recognizer.clone()), speech_rx);
        let (_tx, mut rx) = actions();
        ctrl.dispatch(UserAction::Start).unwrap();
        settle(&mut ctrl, &mut rx).await;

        ctrl.dispatch(UserAction::StartListening).unwrap();
        assert!(ctrl.is_listening());
        speech_tx
            .send(RecognitionEvent::Final("I led the redesign".to_string()))
            .unwrap();
        settle(&mut ctrl, &mut rx).await;
        assert_eq!(ctrl.response().transcript(), "I led the redesign");
        assert_eq!(ctrl.status(), SessionStatus::AwaitingResponse);

        advance(Duration::from_millis(2500)).await;
        settle(&mut ctrl, &mut rx).await;

        assert!(!ctrl.is_listening());
        assert_eq!(recognizer.stops(), 1);
        assert_eq!(ctrl.scores().len(), 1);
        assert_eq!(ctrl.current_question().unwrap().index, 1);
        assert_eq!(ctrl.snapshot().transcripts[&0], "I led the redesign");
    }

    #[tokio::test(start_paused = true)]
    async fn no_speech_publishes_a_notice_without_submitting() {
        let (_speech_tx, speech_rx) = mpsc::unbounded_channel();
        let mut ctrl = controller(scripted(TWO_QUESTIONS, GOOD_SCORE), 2)
            .with_recognizer(Box::new(FakeRecognizer::default()), speech_rx);
        let mut events = ctrl.subscribe();
        let (_tx, mut rx) = actions();
        ctrl.dispatch(UserAction::Start).unwrap();
        settle(&mut ctrl, &mut rx).await;

        ctrl.dispatch(UserAction::StartListening).unwrap();
        advance(Duration::from_secs(15)).await;
        settle(&mut ctrl, &mut rx).await;

        assert!(!ctrl.is_listening());
        assert_eq!(ctrl.status(), SessionStatus::AwaitingResponse);
        assert!(ctrl.scores().is_empty());
        assert!(drain(&mut events).iter().any(|e| matches!(
            e,
            SessionEvent::Notice(Notice { message, .. }) if message == NO_SPEECH_NOTICE
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn question_waits_for_its_utterance_to_end() {
        let (synth_tx, synth_rx) = mpsc::unbounded_channel();
        let synthesizer = FakeSynthesizer::default();
        let mut ctrl = controller(scripted(TWO_QUESTIONS, GOOD_SCORE), 2)
            .with_synthesizer(Box::new(synthesizer.clone()), synth_rx);
        let (_tx, mut rx) = actions();
        ctrl.dispatch(UserAction::Start).unwrap();
        settle(&mut ctrl, &mut rx).await;

        assert_eq!(ctrl.status(), SessionStatus::QuestionPresenting);
        let id = synthesizer.playing_id().unwrap();
        synth_tx.send(SynthesisEvent::Ended(id)).unwrap();
        settle(&mut ctrl, &mut rx).await;
        assert_eq!(ctrl.status(), SessionStatus::AwaitingResponse);

        answer(&mut ctrl, &mut rx, ANSWER).await;
        assert_eq!(ctrl.status(), SessionStatus::AdvancingQuestion);
        assert_eq!(
            synthesizer.audible().as_deref(),
            Some("Well structured. What would you change?")
        );

        ctrl.dispatch(UserAction::NextQuestion).unwrap();
        assert_eq!(ctrl.status(), SessionStatus::QuestionPresenting);
        assert_eq!(
            synthesizer.audible().as_deref(),
            Some("Describe a system you scaled.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn answering_during_the_question_cancels_speech() {
        let (_synth_tx, synth_rx) = mpsc::unbounded_channel();
        let synthesizer = FakeSynthesizer::default();
        let mut ctrl = controller(scripted(TWO_QUESTIONS, GOOD_SCORE), 2)
            .with_synthesizer(Box::new(synthesizer.clone()), synth_rx);
        let (_tx, mut rx) = actions();
        ctrl.dispatch(UserAction::Start).unwrap();
        settle(&mut ctrl, &mut rx).await;
        assert_eq!(ctrl.status(), SessionStatus::QuestionPresenting);

        ctrl.dispatch(UserAction::SetResponseText("Because".into())).unwrap();

        assert_eq!(ctrl.status(), SessionStatus::AwaitingResponse);
        assert_eq!(synthesizer.audible(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn muting_the_voice_does_not_stall_the_session() {
        let (_synth_tx, synth_rx) = mpsc::unbounded_channel();
        let synthesizer = FakeSynthesizer::default();
        let mut ctrl = controller(scripted(TWO_QUESTIONS, GOOD_SCORE), 2)
            .with_synthesizer(Box::new(synthesizer.clone()), synth_rx);
        let (_tx, mut rx) = actions();
        ctrl.dispatch(UserAction::Start).unwrap();
        settle(&mut ctrl, &mut rx).await;
        assert_eq!(ctrl.status(), SessionStatus::QuestionPresenting);

        ctrl.dispatch(UserAction::SetVoiceMuted(true)).unwrap();
        assert_eq!(ctrl.status(), SessionStatus::AwaitingResponse);

        answer(&mut ctrl, &mut rx, ANSWER).await;
        // Feedback is muted, so the next question follows straight away.
        assert_eq!(ctrl.status(), SessionStatus::AwaitingResponse);
        assert_eq!(ctrl.current_question().unwrap().index, 1);
        assert_eq!(synthesizer.spoken().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ending_mid_session_releases_devices_and_keeps_data() {
        let media = FakeMedia::default();
        let detector = FakeEmotionDetector::default();
        let (emotion_tx, emotion_rx) = mpsc::unbounded_channel();
        let (_speech_tx, speech_rx) = mpsc::unbounded_channel();
        let recognizer = FakeRecognizer::default();
        let mut ctrl = controller(scripted(TWO_QUESTIONS, GOOD_SCORE), 2)
            .with_media(Arc::new(media.clone()))
            .with_emotion_detector(Box::new(detector.clone()), emotion_rx)
            .with_recognizer(Box::new(recognizer.clone()), speech_rx);
        let (_tx, mut rx) = actions();

        ctrl.dispatch(UserAction::Start).unwrap();
        settle(&mut ctrl, &mut rx).await;
        assert_eq!(media.live_tracks(), 2);
        assert!(detector.is_running());

        emotion_tx
            .send(EmotionVector::from([("happy".to_string(), 0.6)]))
            .unwrap();
        settle(&mut ctrl, &mut rx).await;
        answer(&mut ctrl, &mut rx, ANSWER).await;
        ctrl.dispatch(UserAction::StartListening).unwrap();
        // Delivered but not yet handled when the session ends.
        emotion_tx
            .send(EmotionVector::from([("happy".to_string(), 0.2)]))
            .unwrap();

        ctrl.dispatch(UserAction::End).unwrap();

        assert_eq!(ctrl.status(), SessionStatus::Completed);
        assert_eq!(media.live_tracks(), 0);
        assert!(!detector.is_running());
        assert_eq!(detector.stops(), 1);
        assert!(!ctrl.is_listening());
        assert_eq!(recognizer.stops(), 1);

        let report = ctrl.report().unwrap();
        assert_eq!(report.per_question_scores.len(), 1);
        assert_eq!(report.emotion_timeline.len(), 2);
        assert_eq!(report.emotion_timeline[0].question_index, Some(0));
        assert_eq!(report.emotion_timeline[1].question_index, Some(1));
        let EmotionSummary::Mean(mean) = &report.emotion_mean else {
            panic!("expected emotion data");
        };
        assert!((mean["happy"] - 0.4).abs() < 1e-9);
        assert_eq!(ctrl.dispatch(UserAction::Start), Err(SessionError::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn ending_while_scoring_drops_the_call() {
        let mut ctrl = controller(scripted(TWO_QUESTIONS, GOOD_SCORE), 2);
        let (_tx, mut rx) = actions();
        ctrl.dispatch(UserAction::Start).unwrap();
        settle(&mut ctrl, &mut rx).await;
        ctrl.dispatch(UserAction::SetResponseText(ANSWER.to_string())).unwrap();
        ctrl.dispatch(UserAction::Submit).unwrap();

        ctrl.dispatch(UserAction::End).unwrap();

        assert!(ctrl.pending.is_none());
        let report = ctrl.report().unwrap();
        assert_eq!(report.transcripts[&0], ANSWER);
        assert!(report.per_question_scores.is_empty());
        assert_eq!(report.overall_score, None);
    }

    #[tokio::test(start_paused = true)]
    async fn ending_before_start_still_reports() {
        let mut model = MockGenerativeModel::new();
        model.expect_generate().never();
        let ctrl = controller(model, 2);
        let (tx, rx) = actions();
        drop(tx);

        let report = ctrl.run(rx).await;

        assert_eq!(report.session.status, SessionStatus::Completed);
        assert!(report.questions.is_empty());
        assert_eq!(report.emotion_mean, EmotionSummary::NoData);
    }

    #[tokio::test(start_paused = true)]
    async fn microphone_toggle_keeps_the_device_and_stops_capture() {
        let media = FakeMedia::default();
        let (_speech_tx, speech_rx) = mpsc::unbounded_channel();
        let mut ctrl = controller(scripted(TWO_QUESTIONS, GOOD_SCORE), 2)
            .with_media(Arc::new(media.clone()))
            .with_recognizer(Box::new(FakeRecognizer::default()), speech_rx);
        let (_tx, mut rx) = actions();
        ctrl.dispatch(UserAction::Start).unwrap();
        settle(&mut ctrl, &mut rx).await;
        ctrl.dispatch(UserAction::StartListening).unwrap();

        ctrl.dispatch(UserAction::ToggleMicrophone).unwrap();

        assert!(!ctrl.is_listening());
        assert_eq!(media.track_enabled(TrackKind::Audio), Some(false));
        assert_eq!(media.live_tracks(), 2);
        assert_eq!(media.opens(), 1);
        assert_eq!(
            ctrl.dispatch(UserAction::StartListening),
            Err(SessionError::MicrophoneMuted)
        );

        ctrl.dispatch(UserAction::ToggleCamera).unwrap();
        assert_eq!(media.track_enabled(TrackKind::Video), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_recognizer_degrades_to_typing_once() {
        let mut ctrl = controller(scripted(TWO_QUESTIONS, GOOD_SCORE), 2);
        let mut events = ctrl.subscribe();
        let (_tx, mut rx) = actions();
        ctrl.dispatch(UserAction::Start).unwrap();
        settle(&mut ctrl, &mut rx).await;

        ctrl.dispatch(UserAction::StartListening).unwrap();
        ctrl.dispatch(UserAction::StartListening).unwrap();

        let advisories = drain(&mut events)
            .into_iter()
            .filter(|e| matches!(
                e,
                SessionEvent::Notice(Notice {
                    kind: Some(ErrorKind::CapabilityMissing),
                    message,
                    ..
                }) if message.contains("speech recognition")
            ))
            .count();
        assert_eq!(advisories, 1);
        assert_eq!(ctrl.status(), SessionStatus::AwaitingResponse);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_recognizer_is_never_started() {
        let (_speech_tx, speech_rx) = mpsc::unbounded_channel();
        let recognizer = FakeRecognizer::unavailable();
        let mut ctrl = controller(scripted(TWO_QUESTIONS, GOOD_SCORE), 2)
            .with_recognizer(Box::new(recognizer.clone()), speech_rx);
        let mut events = ctrl.subscribe();
        let (_tx, mut rx) = actions();
        ctrl.dispatch(UserAction::Start).unwrap();
        settle(&mut ctrl, &mut rx).await;

        ctrl.dispatch(UserAction::StartListening).unwrap();

        assert!(!ctrl.is_listening());
        assert_eq!(recognizer.starts(), 0);
        assert!(drain(&mut events).iter().any(|e| matches!(
            e,
            SessionEvent::Notice(Notice {
                kind: Some(ErrorKind::CapabilityMissing),
                ..
            })
        )));

        // Typing still works.
        answer(&mut ctrl, &mut rx, ANSWER).await;
        assert_eq!(ctrl.scores().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_listen_opens_capture_for_each_question() {
        let (_speech_tx, speech_rx) = mpsc::unbounded_channel();
        let recognizer = FakeRecognizer::default();
        let config = SessionConfig {
            auto_listen: true,
            ..config(2)
        };
        let mut ctrl = controller_with(scripted(TWO_QUESTIONS, GOOD_SCORE), config)
            .with_recognizer(Box::new(recognizer.clone()), speech_rx);
        let (_tx, mut rx) = actions();
        ctrl.dispatch(UserAction::Start).unwrap();
        settle(&mut ctrl, &mut rx).await;

        assert_eq!(ctrl.status(), SessionStatus::AwaitingResponse);
        assert!(ctrl.is_listening());
        assert_eq!(recognizer.starts(), 1);

        answer(&mut ctrl, &mut rx, ANSWER).await;
        assert_eq!(ctrl.current_question().unwrap().index, 1);
        assert!(ctrl.is_listening());
        assert_eq!(recognizer.stops(), 1);
        assert_eq!(recognizer.starts(), 2);
    }

    #[test]
    fn actions_out_of_order_are_rejected() {
        let mut model = MockGenerativeModel::new();
        model.expect_generate().never();
        let mut ctrl = controller(model, 2);

        assert_eq!(
            ctrl.dispatch(UserAction::Submit),
            Err(SessionError::InvalidState {
                action: "submit a response",
                status: SessionStatus::Idle
            })
        );
        assert!(ctrl.dispatch(UserAction::NextQuestion).is_err());
        assert!(ctrl.dispatch(UserAction::ProceedOffline).is_err());
        assert_eq!(ctrl.status(), SessionStatus::Idle);
    }
}
