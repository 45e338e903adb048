use async_trait::async_trait;
use log::{ debug, warn };
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::BoxError;
use crate::models::chat::Conversation;
use crate::orchestrator::ReplyHook;

#[async_trait]
pub trait SpeechOutput: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), BoxError>;
}

/// Speaks through an external program that reads text on stdin, e.g. `espeak` or
/// `say`. The program runs in the background; the console does not wait for it.
#[derive(Debug, Clone)]
pub struct CommandSpeech {
    program: String,
    args: Vec<String>,
}

impl CommandSpeech {
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self { program, args: parts.collect() })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl SpeechOutput for CommandSpeech {
    async fn speak(&self, text: &str) -> Result<(), BoxError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("Failed to start speech command '{}': {}", self.program, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
        }

        let program = self.program.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!("Speech command '{}' finished", program),
                Ok(status) => warn!("Speech command '{}' exited with {}", program, status),
                Err(e) => warn!("Speech command '{}' failed: {}", program, e),
            }
        });
        Ok(())
    }
}

/// Reads every finished reply aloud.
pub struct SpeechHook {
    output: Arc<dyn SpeechOutput>,
}

impl SpeechHook {
    pub fn new(output: Arc<dyn SpeechOutput>) -> Self {
        Self { output }
    }
}

#[async_trait]
impl ReplyHook for SpeechHook {
    async fn on_reply(&self, _conversation: &Conversation, reply: &str) -> Result<(), BoxError> {
        if reply.trim().is_empty() {
            return Ok(());
        }
        self.output.speak(reply).await
    }
}
