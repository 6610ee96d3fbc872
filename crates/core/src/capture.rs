//! Continuous speech capture with silence-based auto-submit.
//!
//! The recognizer itself is an external collaborator. It reports what it hears
//! as [`RecognitionEvent`]s on a channel; [`SpeechCapture`] turns those into
//! [`CaptureSignal`]s for the session, running two timers along the way: a
//! silence debounce that auto-submits once the candidate stops talking, and an
//! absolute no-speech timeout.

use crate::debounce::Debounce;
use crate::error::DeviceError;
use crate::recv_or_pending;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

pub const DEFAULT_SILENCE_WINDOW: Duration = Duration::from_millis(2500);
pub const DEFAULT_NO_SPEECH_TIMEOUT: Duration = Duration::from_secs(15);

const RECOGNIZER: &str = "speech recognition";
const MICROPHONE: &str = "microphone";

/// Raw events emitted by a recognizer running in continuous, interim-results mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Started,
    Interim(String),
    Final(String),
    /// Error code as reported by the engine, e.g. `not-allowed` or `network`.
    Error(String),
    Ended,
}

/// A speech-to-text engine. Implementations push their events to the channel
/// handed to [`SpeechCapture::new`].
pub trait Recognizer: Send {
    fn is_available(&self) -> bool;
    fn start(&mut self) -> Result<(), DeviceError>;
    fn stop(&mut self);
}

/// What the capture controller tells its subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSignal {
    Listening,
    /// For display only; never retained.
    Interim(String),
    Final(String),
    /// Silence after at least one final fragment. Capture has already stopped.
    Submit(String),
    /// Nothing was heard before the absolute timeout. Capture has stopped.
    NoSpeech,
    /// Recognition cannot be used. The candidate should type instead.
    Degraded(DeviceError),
    /// A transient engine error. Capture has stopped and may be restarted.
    Failed(String),
    Stopped,
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureSettings {
    pub silence_window: Duration,
    pub no_speech_timeout: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            silence_window: DEFAULT_SILENCE_WINDOW,
            no_speech_timeout: DEFAULT_NO_SPEECH_TIMEOUT,
        }
    }
}

pub struct SpeechCapture {
    recognizer: Option<Box<dyn Recognizer>>,
    events: Option<UnboundedReceiver<RecognitionEvent>>,
    active: bool,
    heard_speech: bool,
    fragments: Vec<String>,
    silence: Debounce,
    no_speech: Debounce,
}

impl SpeechCapture {
    pub fn new(
        recognizer: Box<dyn Recognizer>,
        events: UnboundedReceiver<RecognitionEvent>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            recognizer: Some(recognizer),
            events: Some(events),
            ..Self::unavailable(settings)
        }
    }

    /// A controller for a runtime without speech recognition. Every `start`
    /// reports [`DeviceError::CapabilityMissing`].
    pub fn unavailable(settings: CaptureSettings) -> Self {
        Self {
            recognizer: None,
            events: None,
            active: false,
            heard_speech: false,
            fragments: Vec::new(),
            silence: Debounce::new(settings.silence_window),
            no_speech: Debounce::new(settings.no_speech_timeout),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Final fragments heard since the last `start`, joined with spaces.
    pub fn transcript(&self) -> String {
        self.fragments.join(" ")
    }

    /// Begins continuous recognition. Returns `Ok(false)` if already running.
    pub fn start(&mut self) -> Result<bool, DeviceError> {
        if self.active {
            return Ok(false);
        }
        let recognizer = match self.recognizer.as_mut() {
            Some(recognizer) if recognizer.is_available() => recognizer,
            _ => return Err(DeviceError::CapabilityMissing(RECOGNIZER)),
        };
        recognizer.start()?;

        self.active = true;
        self.heard_speech = false;
        self.fragments.clear();
        self.silence.cancel();
        self.no_speech.reset();
        tracing::debug!("Speech capture started");
        Ok(true)
    }

    /// Idempotent. Returns whether capture was running.
    pub fn stop(&mut self) -> bool {
        self.silence.cancel();
        self.no_speech.cancel();
        if !self.active {
            return false;
        }
        self.active = false;
        if let Some(recognizer) = self.recognizer.as_mut() {
            recognizer.stop();
        }
        tracing::debug!("Speech capture stopped");
        true
    }

    pub fn handle_event(&mut self, event: RecognitionEvent) -> Option<CaptureSignal> {
        match event {
            RecognitionEvent::Started => self.active.then_some(CaptureSignal::Listening),
            RecognitionEvent::Interim(text) => {
                if !self.active {
                    return None;
                }
                self.mark_speech();
                Some(CaptureSignal::Interim(text))
            }
            RecognitionEvent::Final(text) => {
                if !self.active {
                    return None;
                }
                self.mark_speech();
                let text = text.trim().to_string();
                if text.is_empty() {
                    return None;
                }
                tracing::debug!("Final fragment: {}", text);
                self.fragments.push(text.clone());
                Some(CaptureSignal::Final(text))
            }
            RecognitionEvent::Error(code) => self.on_error(&code),
            RecognitionEvent::Ended => {
                // The engine may end on its own; the buffer survives for manual submit.
                self.silence.cancel();
                self.no_speech.cancel();
                if std::mem::take(&mut self.active) {
                    Some(CaptureSignal::Stopped)
                } else {
                    None
                }
            }
        }
    }

    fn on_error(&mut self, code: &str) -> Option<CaptureSignal> {
        match code {
            "aborted" | "no-speech" => None,
            "not-allowed" | "service-not-allowed" => {
                tracing::warn!("Speech recognition permission denied ({})", code);
                self.stop();
                Some(CaptureSignal::Degraded(DeviceError::PermissionDenied(
                    MICROPHONE,
                )))
            }
            "audio-capture" => {
                self.stop();
                Some(CaptureSignal::Degraded(DeviceError::CapabilityMissing(
                    MICROPHONE,
                )))
            }
            other => {
                tracing::warn!("Speech recognition error: {}", other);
                self.stop();
                Some(CaptureSignal::Failed(other.to_string()))
            }
        }
    }

    fn mark_speech(&mut self) {
        self.heard_speech = true;
        self.no_speech.cancel();
        self.silence.reset();
    }

    fn on_silence(&mut self) -> Option<CaptureSignal> {
        if !self.active || self.fragments.is_empty() {
            return None;
        }
        let transcript = self.transcript();
        self.stop();
        tracing::info!("Silence detected, auto-submitting {} chars", transcript.len());
        Some(CaptureSignal::Submit(transcript))
    }

    fn on_no_speech(&mut self) -> Option<CaptureSignal> {
        if !self.active || self.heard_speech {
            return None;
        }
        self.stop();
        tracing::info!("No speech detected before timeout");
        Some(CaptureSignal::NoSpeech)
    }

    /// Waits for the next signal worth reporting. Cancel-safe.
    pub async fn next_signal(&mut self) -> CaptureSignal {
        loop {
            let signal = tokio::select! {
                event = recv_or_pending(&mut self.events) => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        tracing::debug!("Recognizer event channel closed");
                        self.events = None;
                        None
                    }
                },
                () = self.silence.fired() => self.on_silence(),
                () = self.no_speech.fired() => self.on_no_speech(),
            };
            if let Some(signal) = signal {
                return signal;
            }
        }
    }
}
