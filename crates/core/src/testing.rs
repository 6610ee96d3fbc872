//! Hand-written fakes for the device-side collaborators.

use crate::capture::Recognizer;
use crate::emotion::EmotionDetector;
use crate::error::DeviceError;
use crate::media::{MediaDevices, MediaRequest, MediaStream, TrackKind};
use crate::speech_output::{Synthesizer, UtteranceId};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct RecognizerState {
    starts: usize,
    stops: usize,
    unavailable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FakeRecognizer {
    state: Arc<Mutex<RecognizerState>>,
}

impl FakeRecognizer {
    /// A recognizer the platform reports as missing.
    pub fn unavailable() -> Self {
        let recognizer = Self::default();
        recognizer.state.lock().unwrap().unavailable = true;
        recognizer
    }

    pub fn starts(&self) -> usize {
        self.state.lock().unwrap().starts
    }

    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }
}

impl Recognizer for FakeRecognizer {
    fn is_available(&self) -> bool {
        !self.state.lock().unwrap().unavailable
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        self.state.lock().unwrap().starts += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.state.lock().unwrap().stops += 1;
    }
}

#[derive(Debug, Default)]
struct SynthesizerState {
    playing: Option<(UtteranceId, String)>,
    spoken: Vec<String>,
    cancels: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FakeSynthesizer {
    state: Arc<Mutex<SynthesizerState>>,
}

impl FakeSynthesizer {
    /// Text of the utterance currently playing.
    pub fn audible(&self) -> Option<String> {
        self.state.lock().unwrap().playing.as_ref().map(|(_, text)| text.clone())
    }

    pub fn playing_id(&self) -> Option<UtteranceId> {
        self.state.lock().unwrap().playing.as_ref().map(|(id, _)| *id)
    }

    pub fn spoken(&self) -> Vec<String> {
        self.state.lock().unwrap().spoken.clone()
    }

    pub fn cancels(&self) -> usize {
        self.state.lock().unwrap().cancels
    }
}

impl Synthesizer for FakeSynthesizer {
    fn is_available(&self) -> bool {
        true
    }

    fn play(&mut self, id: UtteranceId, text: &str) -> Result<(), DeviceError> {
        let mut state = self.state.lock().unwrap();
        state.playing = Some((id, text.to_string()));
        state.spoken.push(text.to_string());
        Ok(())
    }

    fn cancel(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.playing = None;
        state.cancels += 1;
    }
}

#[derive(Debug, Default)]
struct MediaState {
    opens: usize,
    audio: Option<bool>,
    video: Option<bool>,
}

/// Grants every request. Tracks stay live until the stream is stopped.
#[derive(Debug, Clone, Default)]
pub struct FakeMedia {
    state: Arc<Mutex<MediaState>>,
}

impl FakeMedia {
    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub fn live_tracks(&self) -> usize {
        let state = self.state.lock().unwrap();
        usize::from(state.audio.is_some()) + usize::from(state.video.is_some())
    }

    pub fn track_enabled(&self, kind: TrackKind) -> Option<bool> {
        let state = self.state.lock().unwrap();
        match kind {
            TrackKind::Audio => state.audio,
            TrackKind::Video => state.video,
        }
    }
}

#[async_trait]
impl MediaDevices for FakeMedia {
    async fn open(&self, request: MediaRequest) -> Result<Box<dyn MediaStream>, DeviceError> {
        let mut state = self.state.lock().unwrap();
        state.opens += 1;
        state.audio = request.audio.then_some(true);
        state.video = request.video.then_some(true);
        Ok(Box::new(FakeStream {
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeStream {
    state: Arc<Mutex<MediaState>>,
}

impl MediaStream for FakeStream {
    fn set_track_enabled(&mut self, kind: TrackKind, enabled: bool) {
        let mut state = self.state.lock().unwrap();
        let track = match kind {
            TrackKind::Audio => &mut state.audio,
            TrackKind::Video => &mut state.video,
        };
        if let Some(flag) = track.as_mut() {
            *flag = enabled;
        }
    }

    fn live_tracks(&self) -> usize {
        let state = self.state.lock().unwrap();
        usize::from(state.audio.is_some()) + usize::from(state.video.is_some())
    }

    fn stop(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.audio = None;
        state.video = None;
    }
}

#[derive(Debug, Default)]
struct DetectorState {
    running: bool,
    stops: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FakeEmotionDetector {
    state: Arc<Mutex<DetectorState>>,
}

impl FakeEmotionDetector {
    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }
}

impl EmotionDetector for FakeEmotionDetector {
    fn start(&mut self) -> Result<(), DeviceError> {
        self.state.lock().unwrap().running = true;
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.running = false;
        state.stops += 1;
    }
}
