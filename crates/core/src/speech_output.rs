use crate::error::DeviceError;
use crate::recv_or_pending;
use tokio::sync::mpsc::UnboundedReceiver;

pub type UtteranceId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    Ended(UtteranceId),
}

/// A text-to-speech engine. The engine is process-wide; only [`SpeechOutput`]
/// calls `play` and `cancel` on it.
pub trait Synthesizer: Send {
    fn is_available(&self) -> bool;
    fn play(&mut self, id: UtteranceId, text: &str) -> Result<(), DeviceError>;
    fn cancel(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeakOutcome {
    Started(UtteranceId),
    Muted,
    /// No engine. `first_notice` is true exactly once per controller.
    Unavailable { first_notice: bool },
    Failed(DeviceError),
}

/// Single-utterance speech output with cancel-before-play.
pub struct SpeechOutput {
    synthesizer: Option<Box<dyn Synthesizer>>,
    events: Option<UnboundedReceiver<SynthesisEvent>>,
    muted: bool,
    next_id: UtteranceId,
    current: Option<UtteranceId>,
    missing_notified: bool,
}

impl SpeechOutput {
    pub fn new(
        synthesizer: Box<dyn Synthesizer>,
        events: UnboundedReceiver<SynthesisEvent>,
    ) -> Self {
        Self {
            synthesizer: Some(synthesizer),
            events: Some(events),
            ..Self::unavailable()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            synthesizer: None,
            events: None,
            muted: false,
            next_id: 1,
            current: None,
            missing_notified: false,
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_speaking(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<UtteranceId> {
        self.current
    }

    /// Cancels whatever is playing and starts `text`. Only the most recent
    /// request is ever audible.
    pub fn speak(&mut self, text: &str) -> SpeakOutcome {
        if self.muted {
            return SpeakOutcome::Muted;
        }
        let synthesizer = match self.synthesizer.as_mut() {
            Some(synthesizer) if synthesizer.is_available() => synthesizer,
            _ => {
                let first_notice = !std::mem::replace(&mut self.missing_notified, true);
                if first_notice {
                    tracing::warn!("Speech synthesis unavailable, interviewer lines will be text only");
                }
                return SpeakOutcome::Unavailable { first_notice };
            }
        };

        if self.current.take().is_some() {
            synthesizer.cancel();
        }
        let id = self.next_id;
        self.next_id += 1;
        match synthesizer.play(id, text) {
            Ok(()) => {
                tracing::debug!("Speaking utterance {}: {:.40}", id, text);
                self.current = Some(id);
                SpeakOutcome::Started(id)
            }
            Err(e) => {
                tracing::warn!("Failed to start utterance {}: {}", id, e);
                SpeakOutcome::Failed(e)
            }
        }
    }

    /// Returns the cancelled utterance, if one was playing.
    pub fn cancel(&mut self) -> Option<UtteranceId> {
        let cancelled = self.current.take()?;
        if let Some(synthesizer) = self.synthesizer.as_mut() {
            synthesizer.cancel();
        }
        tracing::debug!("Cancelled utterance {}", cancelled);
        Some(cancelled)
    }

    /// Muting also silences the current utterance. Returns the cancelled
    /// utterance, if any.
    pub fn set_muted(&mut self, muted: bool) -> Option<UtteranceId> {
        self.muted = muted;
        if muted { self.cancel() } else { None }
    }

    /// Returns the id if `event` finished the current utterance. End events of
    /// superseded utterances are dropped.
    pub fn handle_event(&mut self, event: SynthesisEvent) -> Option<UtteranceId> {
        match event {
            SynthesisEvent::Ended(id) if self.current == Some(id) => {
                self.current = None;
                Some(id)
            }
            SynthesisEvent::Ended(id) => {
                tracing::trace!("Ignoring end of superseded utterance {}", id);
                None
            }
        }
    }

    /// Waits until the current utterance finishes playing. Cancel-safe.
    pub async fn next_finished(&mut self) -> UtteranceId {
        loop {
            match recv_or_pending(&mut self.events).await {
                Some(event) => {
                    if let Some(id) = self.handle_event(event) {
                        return id;
                    }
                }
                None => {
                    tracing::debug!("Synthesizer event channel closed");
                    self.events = None;
                }
            }
        }
    }
}
