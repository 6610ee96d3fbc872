//! Terminal front end: typed commands in, rendered session events out.

use interview_core::error::DeviceError;
use interview_core::SessionStatus;
use interview_core::session::{Notice, SessionEvent, UserAction};
use interview_core::speech_output::{SynthesisEvent, Synthesizer, UtteranceId};
use secrecy::SecretString;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Simulated reading pace for interviewer lines.
const PER_WORD: Duration = Duration::from_millis(250);

pub const HELP: &str = "Type your answer and press Enter to submit it. An answer typed while
the interviewer is giving feedback skips ahead to the next question. Commands:
  /next           skip the feedback and move on
  /mic, /camera   toggle the microphone or camera
  /mute, /unmute  silence or restore the interviewer voice
  /retry          retry the AI service connection
  /offline        continue with prepared questions
  /key <API_KEY>  use a different API key
  /end            end the interview and print the report";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConsoleError {
    #[error("Unknown command: {0}. Type /help for the list of commands.")]
    UnknownCommand(String),
    #[error("Usage: /key <API_KEY>")]
    MissingKey,
    #[error("{}", HELP)]
    Help,
}

/// Turns one line of terminal input into session actions. `advancing` is
/// whether the interviewer is between an answer's feedback and the next
/// question.
pub fn parse_line(line: &str, advancing: bool) -> Result<Vec<UserAction>, ConsoleError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }
    let Some(command) = line.strip_prefix('/') else {
        let mut actions = Vec::with_capacity(3);
        if advancing {
            actions.push(UserAction::NextQuestion);
        }
        actions.push(UserAction::SetResponseText(line.to_string()));
        actions.push(UserAction::Submit);
        return Ok(actions);
    };

    let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
    let action = match name.to_lowercase().as_str() {
        "next" => UserAction::NextQuestion,
        "end" | "quit" => UserAction::End,
        "mic" => UserAction::ToggleMicrophone,
        "camera" => UserAction::ToggleCamera,
        "mute" => UserAction::SetVoiceMuted(true),
        "unmute" => UserAction::SetVoiceMuted(false),
        "retry" => UserAction::RetryConnection,
        "offline" => UserAction::ProceedOffline,
        "key" => match rest.trim() {
            "" => return Err(ConsoleError::MissingKey),
            key => UserAction::SetCredential(SecretString::from(key)),
        },
        "help" => return Err(ConsoleError::Help),
        _ => return Err(ConsoleError::UnknownCommand(line.to_string())),
    };
    Ok(vec![action])
}

/// Reads commands until end of input, then asks the session to end.
///
/// Blocking; run it on its own thread. Returns early once the session has
/// stopped taking actions.
pub fn forward_lines(
    input: impl BufRead,
    advancing: &AtomicBool,
    actions: &mpsc::Sender<UserAction>,
) {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to read from stdin: {}", e);
                break;
            }
        };
        match parse_line(&line, advancing.load(Ordering::Relaxed)) {
            Ok(parsed) => {
                for action in parsed {
                    if actions.blocking_send(action).is_err() {
                        return;
                    }
                }
            }
            Err(e) => println!("{e}"),
        }
    }
    // End of input ends the interview.
    let _ = actions.blocking_send(UserAction::End);
}

/// Keeps `advancing` in step with the session status.
pub fn track_status(event: &SessionEvent, advancing: &AtomicBool) {
    if let SessionEvent::StatusChanged { to, .. } = event {
        advancing.store(*to == SessionStatus::AdvancingQuestion, Ordering::Relaxed);
    }
}

/// The text to show for an event, if any. Status changes only go to the log.
pub fn render_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::InterviewerLine(line) => Some(format!("Interviewer: {line}")),
        SessionEvent::QuestionPresented(question) => {
            Some(format!("--- Question {} ---", question.index + 1))
        }
        SessionEvent::ScoreRecorded { record, .. } => Some(format!("Score: {}/10", record.score)),
        SessionEvent::Notice(Notice {
            message,
            retry_available,
            ..
        }) => {
            if *retry_available {
                Some(format!("! {message} (/retry to try again, /offline to continue)"))
            } else {
                Some(format!("! {message}"))
            }
        }
        SessionEvent::ListeningChanged(true) => Some("(listening...)".to_string()),
        SessionEvent::StatusChanged { .. }
        | SessionEvent::ListeningChanged(false)
        | SessionEvent::InterimTranscript(_)
        | SessionEvent::TranscriptUpdated(_)
        | SessionEvent::LiveEmotion(_)
        | SessionEvent::Completed(_) => None,
    }
}

/// Stands in for a voice: an utterance "plays" for a time proportional to
/// its length, then reports its end. Lines themselves are printed from
/// [`SessionEvent::InterviewerLine`].
pub struct ConsoleSynthesizer {
    events: mpsc::UnboundedSender<SynthesisEvent>,
}

impl ConsoleSynthesizer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SynthesisEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { events: tx }, rx)
    }
}

impl Synthesizer for ConsoleSynthesizer {
    fn is_available(&self) -> bool {
        true
    }

    fn play(&mut self, id: UtteranceId, text: &str) -> Result<(), DeviceError> {
        let words = text.split_whitespace().count() as u32;
        let duration = PER_WORD * words;
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            // The output ignores ends of utterances it has since cancelled.
            let _ = events.send(SynthesisEvent::Ended(id));
        });
        Ok(())
    }

    fn cancel(&mut self) {}
}
