use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, info, warn };
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{ BoxError, ChatError };
use crate::llm::client::{ RelayTransport, UpstreamResponse };
use crate::llm::sse::SseFragments;
use crate::llm::{ ChatCompletionRequest, GenerationParams };
use crate::models::chat::Conversation;

/// Where a streamed reply is shown. One reply is one growing display unit.
pub trait DisplaySink: Send {
    fn begin_reply(&mut self);
    fn append_fragment(&mut self, fragment: &str);
    fn end_reply(&mut self);
}

/// Side effect run after an assistant reply has been recorded.
#[async_trait]
pub trait ReplyHook: Send + Sync {
    async fn on_reply(&self, conversation: &Conversation, reply: &str) -> Result<(), BoxError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingResponse,
}

/// Drives chat turns for one conversation.
pub struct Orchestrator {
    conversation: Conversation,
    transport: Arc<dyn RelayTransport>,
    params: GenerationParams,
    hooks: Vec<Arc<dyn ReplyHook>>,
    state: SessionState,
    skipped_lines: usize,
}

impl Orchestrator {
    pub fn new(
        conversation: Conversation,
        transport: Arc<dyn RelayTransport>,
        params: GenerationParams
    ) -> Self {
        Self {
            conversation,
            transport,
            params,
            hooks: Vec::new(),
            state: SessionState::Idle,
            skipped_lines: 0,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn ReplyHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut Conversation {
        &mut self.conversation
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut GenerationParams {
        &mut self.params
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Unparseable stream records skipped over the life of this session.
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    /// Runs one turn: records `input`, streams the reply into `display`, records the
    /// reply and runs the hooks. Returns the full reply text.
    pub async fn submit(
        &mut self,
        input: &str,
        display: &mut dyn DisplaySink
    ) -> Result<String, ChatError> {
        if input.trim().is_empty() {
            return Err(ChatError::EmptyInput);
        }

        self.conversation.push_user(input);
        self.state = SessionState::AwaitingResponse;
        let result = self.run_turn(display).await;
        self.state = SessionState::Idle;

        let reply = result?;
        for hook in &self.hooks {
            if let Err(e) = hook.on_reply(&self.conversation, &reply).await {
                warn!("Reply hook failed for session {}: {}", self.conversation.id(), e);
            }
        }
        Ok(reply)
    }

    async fn run_turn(&mut self, display: &mut dyn DisplaySink) -> Result<String, ChatError> {
        let request = ChatCompletionRequest::streaming(
            &self.params,
            self.conversation.messages().to_vec()
        );

        let response = match self.transport.send(&request).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("Chat request for session {} failed: {}", self.conversation.id(), e);
                return Err(ChatError::Network(e.to_string()));
            }
        };

        if !response.is_success() {
            let status = response.status;
            let body = read_error_body(response).await;
            warn!("Chat request rejected with status {}: {}", status, body);
            return Err(ChatError::Api { status, body });
        }

        display.begin_reply();
        let mut fragments = SseFragments::new(response.body);
        while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) => display.append_fragment(&fragment),
                Err(e) => {
                    display.end_reply();
                    self.skipped_lines += fragments.skipped_lines();
                    warn!(
                        "Stream for session {} broke after {} chars: {}",
                        self.conversation.id(),
                        fragments.accumulated().len(),
                        e
                    );
                    return Err(ChatError::Network(e.to_string()));
                }
            }
        }
        display.end_reply();

        let skipped = fragments.skipped_lines();
        if skipped > 0 {
            warn!("Skipped {} unparseable stream record(s) in session {}", skipped, self.conversation.id());
        }
        self.skipped_lines += skipped;

        let reply = fragments.into_text();
        debug!("Reply complete for session {} ({} chars)", self.conversation.id(), reply.len());
        self.conversation.push_assistant(reply.clone());
        Ok(reply)
    }
}

async fn read_error_body(response: UpstreamResponse) -> String {
    let mut body = response.body;
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(e) => {
                warn!("Failed to read error body: {}", e);
                break;
            }
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Orchestrators keyed by session id.
///
/// A session that is still streaming rejects further submissions with
/// [`ChatError::Busy`] rather than queueing them behind the lock.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Mutex<Orchestrator>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, orchestrator: Orchestrator) -> Arc<Mutex<Orchestrator>> {
        let id = orchestrator.conversation().id().to_string();
        let handle = Arc::new(Mutex::new(orchestrator));
        self.sessions.lock().await.insert(id.clone(), Arc::clone(&handle));
        info!("Opened session {}", id);
        handle
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Mutex<Orchestrator>>> {
        self.sessions.lock().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<Mutex<Orchestrator>>> {
        let removed = self.sessions.lock().await.remove(id);
        if removed.is_some() {
            info!("Closed session {}", id);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn submit(
        &self,
        id: &str,
        input: &str,
        display: &mut dyn DisplaySink
    ) -> Result<String, ChatError> {
        let handle = self.get(id).await.ok_or_else(|| ChatError::UnknownSession(id.to_string()))?;
        let mut orchestrator = handle.try_lock().map_err(|_| ChatError::Busy(id.to_string()))?;
        orchestrator.submit(input, display).await
    }
}
