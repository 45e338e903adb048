use clap::Parser;
use std::fmt;
use std::str::FromStr;

use crate::llm::{ DEFAULT_CHAT_MODEL, DEFAULT_UPSTREAM_URL };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Run the credentialed relay server.
    Serve,
    /// Run the interactive terminal console against a relay.
    Console,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseRunModeError {
    message: String,
}

impl fmt::Display for ParseRunModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseRunModeError {}

impl FromStr for RunMode {
    type Err = ParseRunModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "serve" | "relay" => Ok(RunMode::Serve),
            "console" => Ok(RunMode::Console),
            _ =>
                Err(ParseRunModeError {
                    message: format!("Invalid run mode: '{}' (expected serve or console)", s),
                }),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Serve => write!(f, "serve"),
            RunMode::Console => write!(f, "console"),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// What to run: the relay server (serve) or the terminal console (console)
    #[arg(long, env = "RUN_MODE", default_value = "serve")]
    pub mode: RunMode,

    // --- Relay Args ---
    /// Host address and port for the relay to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Upstream chat-completion endpoint the relay forwards to.
    #[arg(long, env = "UPSTREAM_URL", default_value = DEFAULT_UPSTREAM_URL)]
    pub upstream_url: String,

    /// Provider API key attached by the relay. Never sent to console clients.
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub upstream_api_key: Option<String>,

    /// Seconds allowed to establish the upstream connection before answering 502.
    #[arg(long, env = "UPSTREAM_CONNECT_TIMEOUT_SECS", default_value = "10")]
    pub upstream_connect_timeout_secs: u64,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    // --- Console Args ---
    /// Relay endpoint the console sends chat turns to.
    #[arg(long, env = "RELAY_URL", default_value = "http://127.0.0.1:4000/api/chat")]
    pub relay_url: String,

    /// Seconds the console waits to connect to the relay before reporting a network error.
    #[arg(long, env = "RELAY_CONNECT_TIMEOUT_SECS", default_value = "10")]
    pub relay_connect_timeout_secs: u64,

    /// Model name requested for chat completion.
    #[arg(long, env = "CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    pub chat_model: String,

    /// Maximum number of tokens generated per reply.
    #[arg(long, env = "CHAT_MAX_TOKENS", default_value = "2048")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.7")]
    pub temperature: f32,

    /// Path to the prompt configuration file. Built-in prompts are used if unset.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    /// External command that receives each finished reply on stdin (e.g. "espeak").
    #[arg(long, env = "SPEECH_COMMAND")]
    pub speech_command: Option<String>,

    // --- Session Store Args ---
    /// Session store type (memory, file, redis)
    #[arg(long, env = "HISTORY_TYPE", default_value = "file")]
    pub history_type: String,

    /// JSON file holding all saved sessions (file store).
    #[arg(long, env = "HISTORY_PATH", default_value = "sessions.json")]
    pub history_path: String,

    /// Redis endpoint for the redis store (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "HISTORY_HOST", default_value = "redis://127.0.0.1:6379")]
    pub history_host: String,

    /// Redis key under which the session map is stored.
    #[arg(long, env = "HISTORY_REDIS_KEY", default_value = "console:sessions")]
    pub history_redis_key: String,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}
