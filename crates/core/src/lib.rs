//! Core of the interview coach: the session state machine and the
//! components it drives.
//!
//! Devices (speech recognition, speech synthesis, camera/microphone, the
//! facial-expression detector) and the generative model are reached through
//! traits, so a runtime plugs in whatever it has and the rest degrades.

pub mod adapter;
pub mod bank;
pub mod capture;
pub mod config;
pub mod debounce;
pub mod emotion;
pub mod error;
pub mod extract;
pub mod generative;
pub mod media;
pub mod model;
pub mod prompts;
pub mod report;
pub mod scoring;
pub mod session;
pub mod speech_output;

#[cfg(test)]
mod testing;

pub use config::SessionConfig;
pub use error::{DeviceError, ErrorKind, ServiceError, SessionError};
pub use model::{InterviewSetup, InterviewType, SessionStatus};
pub use report::SessionReport;
pub use session::{Notice, SessionController, SessionEvent, UserAction};

use tokio::sync::mpsc::UnboundedReceiver;

/// Receives from an optional channel. A missing receiver never resolves,
/// which keeps it usable as a permanent `select!` branch.
pub(crate) async fn recv_or_pending<T>(rx: &mut Option<UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
