use crate::model::SessionStatus;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// The failure taxonomy shown to subscribers.
///
/// Every failure coming from a collaborator is converted into one of these
/// kinds at the component boundary, so the session state machine only ever
/// matches on this enum and never on transport-level errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The runtime lacks the feature entirely. Degrade, never fatal.
    CapabilityMissing,
    /// The user declined device access. Degrade to manual input.
    PermissionDenied,
    /// Network, timeout or server error while talking to the AI service.
    Transport,
    /// The credential was rejected or is missing.
    Auth,
    /// The AI reply did not have the expected shape.
    Parse,
    /// An action was not valid for the current session state.
    SessionLogic,
}

/// Tagged result of every call made through the AI service adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("generative service is not available")]
    CapabilityMissing,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("credential rejected: {0}")]
    Auth(String),
    #[error("malformed response: {0}")]
    Parse(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::CapabilityMissing => ErrorKind::CapabilityMissing,
            ServiceError::Transport(_) | ServiceError::Timeout(_) => ErrorKind::Transport,
            ServiceError::Auth(_) => ErrorKind::Auth,
            ServiceError::Parse(_) => ErrorKind::Parse,
        }
    }

    /// Auth and capability failures will not fix themselves by waiting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::Transport(_) | ServiceError::Timeout(_) | ServiceError::Parse(_)
        )
    }
}

/// Failures from local devices: recognizer, synthesizer, camera and microphone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("{0} is not supported in this runtime")]
    CapabilityMissing(&'static str),
    #[error("access to the {0} was denied")]
    PermissionDenied(&'static str),
    #[error("{device} failed: {message}")]
    Failed {
        device: &'static str,
        message: String,
    },
}

impl DeviceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeviceError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            DeviceError::CapabilityMissing(_) | DeviceError::Failed { .. } => {
                ErrorKind::CapabilityMissing
            }
        }
    }

    pub fn device(&self) -> &'static str {
        match self {
            DeviceError::CapabilityMissing(device)
            | DeviceError::PermissionDenied(device)
            | DeviceError::Failed { device, .. } => device,
        }
    }
}

/// An action rejected at the session boundary. The state machine is left
/// untouched whenever one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cannot {action} while the session is {status}")]
    InvalidState {
        action: &'static str,
        status: SessionStatus,
    },
    #[error("question {0} is already being scored")]
    ScoringInFlight(usize),
    #[error("the microphone is muted")]
    MicrophoneMuted,
    #[error("the session has already completed")]
    Completed,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::SessionLogic
    }
}
