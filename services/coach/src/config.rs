//! Application Configuration Module
//!
//! Loads the coach settings from environment variables (and a `.env` file,
//! when present) into a single struct that `main` turns into the session
//! configuration and the generative model client.

use interview_core::adapter::ProbeSettings;
use interview_core::config::{DEFAULT_TOTAL_QUESTIONS, MAX_TOTAL_QUESTIONS};
use interview_core::generative::{
    DEFAULT_GEMINI_MODEL, DEFAULT_OPENAI_MODEL, GeminiClient, GenerativeModel, OfflineModel,
    OpenAiClient,
};
use interview_core::prompts::PromptSet;
use interview_core::SessionConfig;
use secrecy::SecretString;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    OpenAi,
    /// No service at all; every question and score comes from prepared content.
    Offline,
}

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: Provider,
    pub openai_api_key: Option<SecretString>,
    pub gemini_api_key: Option<SecretString>,
    pub chat_model: Option<String>,
    pub total_questions: usize,
    pub probe: ProbeSettings,
    pub prompts_dir: Option<PathBuf>,
    pub auto_listen: bool,
    pub log_level: Level,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown AI provider: {0} (expected gemini, openai or offline)")]
    UnknownProvider(String),
    #[error("Invalid value for {var}: {value}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("Invalid value for {var}: {value} (expected true or false)")]
    InvalidFlag { var: &'static str, value: String },
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `AI_PROVIDER`: "gemini", "openai" or "offline". Defaults to "gemini".
    // *   `GEMINI_API_KEY` / `OPENAI_API_KEY`: key for the selected provider. A missing key
    //     is not fatal, the session reports it and accepts a key at runtime.
    // *   `CHAT_MODEL`: (Optional) model name for the selected provider.
    // *   `TOTAL_QUESTIONS`: (Optional) upper bound for the question plan, 1 to 10. Defaults to 5.
    // *   `PROBE_TIMEOUT_SECS`, `PROBE_MAX_ATTEMPTS`, `PROBE_RETRY_DELAY_SECS`: (Optional)
    //     request timeout and connectivity probe schedule.
    // *   `PROMPTS_DIR`: (Optional) directory of `.md` prompt overrides.
    // *   `AUTO_LISTEN`: (Optional) start speech capture after each question. Defaults to false.
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let provider_str = lookup("AI_PROVIDER").unwrap_or_else(|| "gemini".to_string());
        let provider = match provider_str.trim().to_lowercase().as_str() {
            "gemini" => Provider::Gemini,
            "openai" => Provider::OpenAi,
            "offline" => Provider::Offline,
            _ => return Err(ConfigError::UnknownProvider(provider_str)),
        };

        let secret = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .map(SecretString::from)
        };
        let number = |var: &'static str, default: u64| -> Result<u64, ConfigError> {
            match lookup(var) {
                None => Ok(default),
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| ConfigError::InvalidNumber { var, value }),
            }
        };

        let flag = |var: &'static str| -> Result<bool, ConfigError> {
            let Some(value) = lookup(var) else {
                return Ok(false);
            };
            let normalized = value.trim().to_lowercase();
            match normalized.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "" | "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::InvalidFlag { var, value }),
            }
        };

        let defaults = ProbeSettings::default();
        let total_questions = number("TOTAL_QUESTIONS", DEFAULT_TOTAL_QUESTIONS as u64)?;
        if total_questions == 0 || total_questions > MAX_TOTAL_QUESTIONS as u64 {
            return Err(ConfigError::InvalidNumber {
                var: "TOTAL_QUESTIONS",
                value: total_questions.to_string(),
            });
        }
        let probe = ProbeSettings {
            timeout: Duration::from_secs(number("PROBE_TIMEOUT_SECS", defaults.timeout.as_secs())?),
            max_attempts: number("PROBE_MAX_ATTEMPTS", u64::from(defaults.max_attempts))?
                .clamp(1, u64::from(u32::MAX)) as u32,
            retry_delay: Duration::from_secs(number(
                "PROBE_RETRY_DELAY_SECS",
                defaults.retry_delay.as_secs(),
            )?),
        };

        // Configure logging level from RUST_LOG, with a sensible default.
        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            provider,
            openai_api_key: secret("OPENAI_API_KEY"),
            gemini_api_key: secret("GEMINI_API_KEY"),
            chat_model: lookup("CHAT_MODEL").filter(|m| !m.trim().is_empty()),
            total_questions: total_questions as usize,
            probe,
            prompts_dir: lookup("PROMPTS_DIR").map(PathBuf::from),
            auto_listen: flag("AUTO_LISTEN")?,
            log_level,
        })
    }

    /// A service provider is selected but no key was given for it.
    pub fn is_missing_credential(&self) -> bool {
        self.provider != Provider::Offline && self.credential().is_none()
    }

    /// The key for the selected provider.
    pub fn credential(&self) -> Option<SecretString> {
        match self.provider {
            Provider::Gemini => self.gemini_api_key.clone(),
            Provider::OpenAi => self.openai_api_key.clone(),
            Provider::Offline => None,
        }
    }

    pub fn model(&self) -> Arc<dyn GenerativeModel> {
        match self.provider {
            Provider::Gemini => Arc::new(GeminiClient::new(
                self.chat_model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL),
            )),
            Provider::OpenAi => Arc::new(OpenAiClient::new(
                self.chat_model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL),
            )),
            Provider::Offline => Arc::new(OfflineModel),
        }
    }

    pub fn session_config(&self, prompts: PromptSet) -> SessionConfig {
        SessionConfig {
            total_questions: self.total_questions,
            probe: self.probe,
            credential: self.credential(),
            prompts,
            offline: self.provider == Provider::Offline,
            auto_listen: self.auto_listen,
            ..SessionConfig::default()
        }
    }
}
