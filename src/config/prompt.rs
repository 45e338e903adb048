use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::SystemTime;
use log::info;

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant chatting with the user through a terminal console. Keep answers concise.";
const DEFAULT_GREETING: &str = "Ready when you are.";
const DEFAULT_ASSISTANT_LABEL: &str = "Assistant";

#[derive(Debug)]
pub enum PromptError {
    EmptySystemPrompt(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::EmptySystemPrompt(path) =>
                write!(f, "Prompt file '{}' has an empty system_prompt", path),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

/// Console wording: the seeded system prompt and how the assistant is introduced.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PromptConfig {
    pub system_prompt: String,
    #[serde(default = "default_greeting")]
    pub greeting: String,
    #[serde(default = "default_assistant_label")]
    pub assistant_label: String,
    #[serde(skip)]
    pub last_loaded: Option<SystemTime>,
}

fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

fn default_assistant_label() -> String {
    DEFAULT_ASSISTANT_LABEL.to_string()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            greeting: default_greeting(),
            assistant_label: default_assistant_label(),
            last_loaded: None,
        }
    }
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<PromptConfig, PromptError> {
    let path = path.as_ref();
    let file_content = fs::read_to_string(path)?;
    let mut config: PromptConfig = serde_json::from_str(&file_content)?;
    if config.system_prompt.trim().is_empty() {
        return Err(PromptError::EmptySystemPrompt(path.display().to_string()));
    }
    config.last_loaded = Some(SystemTime::now());
    info!("Loaded prompts from {}", path.display());
    Ok(config)
}

/// Returns a fresh config when the file changed after `current` was loaded.
pub fn reload_prompts_if_changed<P: AsRef<Path>>(
    path: P,
    current: &PromptConfig
) -> Result<Option<PromptConfig>, PromptError> {
    let metadata = fs::metadata(&path)?;

    if let Ok(modified) = metadata.modified() {
        match current.last_loaded {
            Some(last_loaded) if modified <= last_loaded => {}
            Some(_) => {
                info!("Prompts file changed, reloading...");
                return load_prompts(path).map(Some);
            }
            None => {
                info!("No last_loaded timestamp, reloading prompts...");
                return load_prompts(path).map(Some);
            }
        }
    }
    Ok(None)
}
