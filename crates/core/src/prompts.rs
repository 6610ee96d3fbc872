use anyhow::Context;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const GENERATE_QUESTIONS: &str = "generate_questions";
pub const SCORE_RESPONSE: &str = "score_response";
pub const PROBE: &str = "probe";

const DEFAULT_GENERATE_QUESTIONS: &str = r#"You are an experienced interviewer preparing a {interview_type} interview for a {role} position at {company}.
Write {count} distinct interview questions, ordered from warm-up to most demanding.
Respond with a JSON array of strings and nothing else, for example:
["First question?", "Second question?"]"#;

const DEFAULT_SCORE_RESPONSE: &str = r#"You are an AI interviewer conducting a {interview_type} interview for a {role} position at {company}.
The current question is: "{question}".
The candidate just responded with: "{response}".
Please analyze this response on a scale of 1-10 and provide specific feedback on what was good and what could be improved.
You need to be critical and challenging, like a real interviewer. Don't just be polite - push the candidate to think deeper.
If the answer is completely wrong or shows significant misunderstanding, point that out directly.
Format your response as JSON with these fields:
- score: numerical score from 1-10
- feedback: your assessment and feedback (2-3 sentences)
- quality: one of "excellent", "good", "average", or "poor"
- challenge: a follow-up question that challenges the candidate to elaborate or rethink their approach"#;

const DEFAULT_PROBE: &str = "Reply with the single word: ready";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("failed to load prompts from {}", dir.display())]
    Load {
        dir: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("prompt override `{0}` is empty")]
    Empty(String),
}

/// The three templates the adapter sends. Placeholders are written `{name}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub generate_questions: String,
    pub score_response: String,
    pub probe: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            generate_questions: DEFAULT_GENERATE_QUESTIONS.to_string(),
            score_response: DEFAULT_SCORE_RESPONSE.to_string(),
            probe: DEFAULT_PROBE.to_string(),
        }
    }
}

impl PromptSet {
    /// Built-in templates overridden by any `generate_questions.md`,
    /// `score_response.md` or `probe.md` found in `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, PromptError> {
        let loaded = load_prompts(dir).map_err(|source| PromptError::Load {
            dir: dir.to_path_buf(),
            source,
        })?;

        let mut prompts = Self::default();
        for (key, content) in loaded {
            let slot = match key.as_str() {
                GENERATE_QUESTIONS => &mut prompts.generate_questions,
                SCORE_RESPONSE => &mut prompts.score_response,
                PROBE => &mut prompts.probe,
                _ => {
                    tracing::warn!("Ignoring unknown prompt file: {}.md", key);
                    continue;
                }
            };
            if content.trim().is_empty() {
                return Err(PromptError::Empty(key));
            }
            tracing::info!("Using prompt override for {}", key);
            *slot = content;
        }
        Ok(prompts)
    }
}

/// Substitutes `{name}` placeholders. Unknown placeholders are left as they are.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |text, (name, value)| {
            text.replace(&format!("{{{name}}}"), value)
        })
}

pub fn load_prompts(dir_path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();

    for entry in fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read prompts directory: {}", dir_path.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem for prompt file")?
                .to_string();

            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;

            prompts.insert(prompt_key, content);
        }
    }

    Ok(prompts)
}
