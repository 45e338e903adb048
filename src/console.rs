use futures::StreamExt;
use log::{ info, warn };
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio_stream::wrappers::LinesStream;
use uuid::Uuid;

use crate::command::{ route_input, Command, Input, Setting, COMMANDS };
use crate::config::prompt::{ reload_prompts_if_changed, PromptConfig };
use crate::error::ChatError;
use crate::history::SessionStore;
use crate::llm::client::RelayTransport;
use crate::llm::GenerationParams;
use crate::models::chat::Conversation;
use crate::orchestrator::{ DisplaySink, Orchestrator, ReplyHook, SessionRegistry };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Echo,
    Info,
    Success,
    Error,
}

/// The console's screen: whole lines plus the streamed reply unit.
pub trait ConsoleOutput: DisplaySink {
    fn line(&mut self, kind: LineKind, text: &str);

    fn set_assistant_label(&mut self, label: &str);

    fn prompt(&mut self, _in_chat: bool) {}
}

/// Plain-text screen over any writer, normally stdout.
pub struct TerminalSink<W: Write + Send> {
    out: W,
    assistant_label: String,
    write_failed: bool,
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(out: W, assistant_label: impl Into<String>) -> Self {
        Self { out, assistant_label: assistant_label.into(), write_failed: false }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// True once a write to the underlying writer has failed.
    pub fn write_failed(&self) -> bool {
        self.write_failed
    }

    fn emit(&mut self, args: fmt::Arguments<'_>) {
        let result = self.out.write_fmt(args).and_then(|_| self.out.flush());
        if let Err(e) = result {
            // only the first failure is logged, a closed stdout fails every write
            if !self.write_failed {
                warn!("Console output failed: {}", e);
            }
            self.write_failed = true;
        }
    }
}

impl<W: Write + Send> DisplaySink for TerminalSink<W> {
    fn begin_reply(&mut self) {
        let label = self.assistant_label.clone();
        self.emit(format_args!("{}: ", label));
    }

    fn append_fragment(&mut self, fragment: &str) {
        self.emit(format_args!("{}", fragment));
    }

    fn end_reply(&mut self) {
        self.emit(format_args!("\n"));
    }
}

impl<W: Write + Send> ConsoleOutput for TerminalSink<W> {
    fn line(&mut self, kind: LineKind, text: &str) {
        match kind {
            LineKind::Echo => self.emit(format_args!(">>> {}\n", text)),
            LineKind::Error => self.emit(format_args!("[error] {}\n", text)),
            LineKind::Info | LineKind::Success => self.emit(format_args!("{}\n", text)),
        }
    }

    fn set_assistant_label(&mut self, label: &str) {
        self.assistant_label = label.to_string();
    }

    fn prompt(&mut self, in_chat: bool) {
        self.emit(format_args!("{}", if in_chat { "chat> " } else { "> " }));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Line-driven chat console: routes input to commands or to the active session.
pub struct Console<O: ConsoleOutput> {
    out: O,
    registry: SessionRegistry,
    transport: Arc<dyn RelayTransport>,
    store: Arc<dyn SessionStore>,
    hooks: Vec<Arc<dyn ReplyHook>>,
    prompts: PromptConfig,
    prompts_path: Option<PathBuf>,
    params: GenerationParams,
    active: Option<String>,
}

impl<O: ConsoleOutput> Console<O> {
    pub fn new(
        mut out: O,
        transport: Arc<dyn RelayTransport>,
        store: Arc<dyn SessionStore>,
        prompts: PromptConfig,
        params: GenerationParams
    ) -> Self {
        out.set_assistant_label(&prompts.assistant_label);
        Self {
            out,
            registry: SessionRegistry::new(),
            transport,
            store,
            hooks: Vec::new(),
            prompts,
            prompts_path: None,
            params,
            active: None,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn ReplyHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Watches a prompt file; it is re-read whenever chat mode is entered.
    pub fn with_prompts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.prompts_path = Some(path.into());
        self
    }

    pub fn output(&self) -> &O {
        &self.out
    }

    pub fn in_chat(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_session(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Reads lines until end of input or `quit`.
    pub async fn run<R: AsyncBufRead + Unpin>(&mut self, input: R) {
        self.out.line(LineKind::Info, "Type `help` for the list of commands.");
        let mut lines = LinesStream::new(input.lines());

        loop {
            self.out.prompt(self.in_chat());
            let Some(line) = lines.next().await else {
                break;
            };
            match line {
                Ok(line) => {
                    if self.handle_line(&line).await == Flow::Quit {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to read console input: {}", e);
                    break;
                }
            }
        }

        if let Some(id) = self.active.take() {
            self.registry.remove(&id).await;
        }
        info!("Console closed");
    }

    pub async fn handle_line(&mut self, line: &str) -> Flow {
        match route_input(line, self.in_chat()) {
            Ok(Input::Empty) => Flow::Continue,
            Ok(Input::Chat(text)) => {
                self.chat_turn(&text).await;
                Flow::Continue
            }
            Ok(Input::Command(command)) => {
                self.out.line(LineKind::Echo, line.trim());
                self.execute(command).await
            }
            Err(e) => {
                self.out.line(LineKind::Echo, line.trim());
                self.out.line(LineKind::Error, &e.to_string());
                Flow::Continue
            }
        }
    }

    async fn chat_turn(&mut self, text: &str) {
        let Some(id) = self.active.clone() else {
            return;
        };
        self.out.line(LineKind::Info, &format!("You: {}", text));

        if let Err(e) = self.registry.submit(&id, text, &mut self.out).await {
            self.out.line(LineKind::Error, &e.to_string());
        }
    }

    async fn execute(&mut self, command: Command) -> Flow {
        let result = match command {
            Command::Chat => self.enter_chat().await,
            Command::Exit => self.exit_chat().await,
            Command::Set(setting) => self.apply_setting(setting).await,
            Command::Show => {
                self.show();
                Ok(())
            }
            Command::Reset => self.reset().await,
            Command::Sessions => self.list_sessions().await,
            Command::Resume(id) => self.resume(&id).await,
            Command::Forget(id) => self.forget(&id).await,
            Command::Help => {
                for (usage, description) in COMMANDS {
                    self.out.line(LineKind::Info, &format!("  {:<24} {}", usage, description));
                }
                Ok(())
            }
            Command::Quit => {
                return Flow::Quit;
            }
        };

        if let Err(message) = result {
            self.out.line(LineKind::Error, &message);
        }
        Flow::Continue
    }

    async fn enter_chat(&mut self) -> Result<(), String> {
        if self.in_chat() {
            return Err("Already in chat mode. Type `exit` to leave it first.".into());
        }
        self.refresh_prompts();

        let id = Uuid::new_v4().to_string();
        let conversation = Conversation::new(id.clone(), Some(&self.prompts.system_prompt));
        self.open(conversation).await;

        self.out.line(
            LineKind::Success,
            &format!("Chat mode activated (model {}). Session {}.", self.params.model, id)
        );
        self.out.line(
            LineKind::Info,
            &format!("{}: {}", self.prompts.assistant_label, self.prompts.greeting)
        );
        self.out.line(
            LineKind::Info,
            "Type `exit` to leave, `set <key> = \"<value>\"` to change settings, `/help` for other commands."
        );
        Ok(())
    }

    async fn exit_chat(&mut self) -> Result<(), String> {
        let id = self.active.clone().ok_or("Not in chat mode.")?;
        if let Some(handle) = self.registry.remove(&id).await {
            if handle.try_lock().is_err() {
                warn!("Session {} closed while a reply was streaming", id);
            }
        }
        self.active = None;
        self.out.line(LineKind::Success, "Exiting chat mode.");
        Ok(())
    }

    async fn apply_setting(&mut self, setting: Setting) -> Result<(), String> {
        let message = match &setting {
            Setting::SystemPrompt(prompt) => {
                self.prompts.system_prompt = prompt.clone();
                "System prompt updated."
            }
            Setting::Model(model) => {
                self.params.model = model.clone();
                "Model updated."
            }
            Setting::Temperature(t) => {
                self.params.temperature = *t;
                "Temperature updated."
            }
            Setting::MaxTokens(n) => {
                self.params.max_tokens = *n;
                "Max tokens updated."
            }
        };

        if let Some(id) = self.active.clone() {
            let handle = self.registry.get(&id).await.ok_or("Active session is gone.")?;
            let mut orchestrator = handle
                .try_lock()
                .map_err(|_| ChatError::Busy(id.clone()).to_string())?;
            match setting {
                Setting::SystemPrompt(prompt) => orchestrator.conversation_mut().set_system_prompt(prompt),
                _ => *orchestrator.params_mut() = self.params.clone(),
            }
        }

        self.out.line(LineKind::Success, message);
        Ok(())
    }

    fn show(&mut self) {
        let lines = [
            format!("model: {}", self.params.model),
            format!("temperature: {}", self.params.temperature),
            format!("max_tokens: {}", self.params.max_tokens),
            format!("system: {}", self.prompts.system_prompt),
            format!("session: {}", self.active.as_deref().unwrap_or("(none)")),
        ];
        for line in &lines {
            self.out.line(LineKind::Info, line);
        }
    }

    async fn reset(&mut self) -> Result<(), String> {
        let id = self.active.clone().ok_or("Not in chat mode.")?;
        let handle = self.registry.get(&id).await.ok_or("Active session is gone.")?;
        let mut orchestrator = handle.try_lock().map_err(|_| ChatError::Busy(id.clone()).to_string())?;
        orchestrator.conversation_mut().reset();
        self.out.line(LineKind::Success, "Conversation cleared.");
        Ok(())
    }

    async fn list_sessions(&mut self) -> Result<(), String> {
        let sessions = self.store.list().await.map_err(|e| e.to_string())?;
        if sessions.is_empty() {
            self.out.line(LineKind::Info, "No saved sessions.");
            return Ok(());
        }
        for session in sessions {
            let marker = if self.active.as_deref() == Some(session.id.as_str()) { "*" } else { " " };
            self.out.line(
                LineKind::Info,
                &format!(
                    "{} {}  {}  {} messages",
                    marker,
                    session.id,
                    session.timestamp,
                    session.message_count
                )
            );
        }
        Ok(())
    }

    async fn resume(&mut self, id: &str) -> Result<(), String> {
        let stored = self.store
            .load(id).await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("No saved session '{}'.", id))?;

        if let Some(current) = self.active.take() {
            self.registry.remove(&current).await;
        }

        let conversation = Conversation::restore(id, stored.messages);
        let count = conversation.len();
        self.open(conversation).await;
        self.out.line(LineKind::Success, &format!("Resumed session {} ({} messages).", id, count));
        Ok(())
    }

    async fn forget(&mut self, id: &str) -> Result<(), String> {
        if self.store.delete(id).await.map_err(|e| e.to_string())? {
            self.out.line(LineKind::Success, &format!("Deleted session {}.", id));
            Ok(())
        } else {
            Err(format!("No saved session '{}'.", id))
        }
    }

    async fn open(&mut self, conversation: Conversation) {
        let id = conversation.id().to_string();
        let mut orchestrator = Orchestrator::new(
            conversation,
            Arc::clone(&self.transport),
            self.params.clone()
        );
        for hook in &self.hooks {
            orchestrator = orchestrator.with_hook(Arc::clone(hook));
        }
        self.registry.insert(orchestrator).await;
        self.active = Some(id);
    }

    fn refresh_prompts(&mut self) {
        let Some(path) = &self.prompts_path else {
            return;
        };
        match reload_prompts_if_changed(path, &self.prompts) {
            Ok(Some(config)) => {
                self.prompts = config;
                self.out.set_assistant_label(&self.prompts.assistant_label);
            }
            Ok(None) => {}
            Err(e) => warn!("Keeping current prompts, reload failed: {}", e),
        }
    }
}
