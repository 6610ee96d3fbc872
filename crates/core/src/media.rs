use crate::error::DeviceError;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaRequest {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaRequest {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// An open camera/microphone handle. Disabling a track mutes it without
/// giving the device back; `stop` releases every track for good.
pub trait MediaStream: Send {
    fn set_track_enabled(&mut self, kind: TrackKind, enabled: bool);
    fn live_tracks(&self) -> usize;
    fn stop(&mut self);
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn open(&self, request: MediaRequest) -> Result<Box<dyn MediaStream>, DeviceError>;
}
