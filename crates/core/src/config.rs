use crate::adapter::ProbeSettings;
use crate::capture::CaptureSettings;
use crate::prompts::PromptSet;
use secrecy::SecretString;

pub const DEFAULT_TOTAL_QUESTIONS: usize = 5;
pub const MAX_TOTAL_QUESTIONS: usize = 10;

/// Controller-level settings. The binary fills this from the environment;
/// tests usually start from `SessionConfig::default()`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound for the question plan. The plan may come out shorter.
    pub total_questions: usize,
    pub capture: CaptureSettings,
    pub probe: ProbeSettings,
    pub credential: Option<SecretString>,
    pub prompts: PromptSet,
    /// Start speech capture as soon as a question has been asked.
    pub auto_listen: bool,
    /// Skip the service entirely and use prepared content.
    pub offline: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            total_questions: DEFAULT_TOTAL_QUESTIONS,
            capture: CaptureSettings::default(),
            probe: ProbeSettings::default(),
            credential: None,
            prompts: PromptSet::default(),
            auto_listen: false,
            offline: false,
        }
    }
}
