mod file;
mod memory;
mod redis;

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;
pub use self::redis::RedisSessionStore;

use async_trait::async_trait;
use chrono::{ SecondsFormat, Utc };
use log::{ debug, info };
use serde::{ Deserialize, Serialize };
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cli::Args;
use crate::error::{ BoxError, StoreError };
use crate::models::chat::{ ChatMessage, Conversation };
use crate::orchestrator::ReplyHook;

/// One saved session: its messages and when it was last written (RFC 3339).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub messages: Vec<ChatMessage>,
    pub timestamp: String,
}

/// Every saved session keyed by id, stored as a single blob.
pub type SessionMap = BTreeMap<String, StoredSession>;

#[derive(Clone, Debug, PartialEq)]
pub struct SessionSummary {
    pub id: String,
    pub timestamp: String,
    pub message_count: usize,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_all(&self) -> Result<SessionMap, StoreError>;

    async fn save_all(&self, sessions: &SessionMap) -> Result<(), StoreError>;

    async fn save(&self, id: &str, messages: &[ChatMessage]) -> Result<(), StoreError> {
        let mut sessions = self.load_all().await?;
        sessions.insert(id.to_string(), StoredSession {
            messages: messages.to_vec(),
            timestamp: now_timestamp(),
        });
        self.save_all(&sessions).await
    }

    async fn load(&self, id: &str) -> Result<Option<StoredSession>, StoreError> {
        Ok(self.load_all().await?.remove(id))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut sessions = self.load_all().await?;
        if sessions.remove(id).is_none() {
            return Ok(false);
        }
        self.save_all(&sessions).await?;
        Ok(true)
    }

    /// Saved sessions, most recently written first.
    async fn list(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let mut summaries: Vec<SessionSummary> = self
            .load_all().await?
            .into_iter()
            .map(|(id, session)| SessionSummary {
                id,
                message_count: session.messages.len(),
                timestamp: session.timestamp,
            })
            .collect();
        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(summaries)
    }
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn create_session_store(args: &Args) -> Result<Arc<dyn SessionStore>, StoreError> {
    match args.history_type.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(MemorySessionStore::new())),
        "file" => Ok(Arc::new(FileSessionStore::new(&args.history_path))),
        "redis" => {
            let store = RedisSessionStore::new(&args.history_host, &args.history_redis_key)?;
            Ok(Arc::new(store))
        }
        other => Err(StoreError::UnsupportedBackend(other.to_string())),
    }
}

pub fn initialize_session_store(args: &Args) -> Result<Arc<dyn SessionStore>, StoreError> {
    let location = match args.history_type.to_lowercase().as_str() {
        "file" => args.history_path.clone(),
        "redis" => format!("{} (key {})", args.history_host, args.history_redis_key),
        _ => "process memory".to_string(),
    };
    info!("Chat sessions will be stored in: {} at {}", args.history_type, location);
    create_session_store(args)
}

/// Saves the whole conversation after every completed assistant turn.
pub struct PersistTurn {
    store: Arc<dyn SessionStore>,
}

impl PersistTurn {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ReplyHook for PersistTurn {
    async fn on_reply(&self, conversation: &Conversation, _reply: &str) -> Result<(), BoxError> {
        self.store.save(conversation.id(), conversation.messages()).await?;
        debug!("Saved session {} ({} messages)", conversation.id(), conversation.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    #[tokio::test]
    async fn persist_turn_saves_full_conversation() {
        let store = Arc::new(MemorySessionStore::new());
        let hook = PersistTurn::new(store.clone());

        let mut conv = Conversation::new("s-1", Some("sys"));
        conv.push_user("hello");
        conv.push_assistant("hi");
        hook.on_reply(&conv, "hi").await.unwrap();

        let stored = store.load("s-1").await.unwrap().unwrap();
        assert_eq!(stored.messages.len(), 3);
        assert_eq!(stored.messages[2], ChatMessage::new(Role::Assistant, "hi"));
        assert!(chrono::DateTime::parse_from_rfc3339(&stored.timestamp).is_ok());
    }

    #[tokio::test]
    async fn list_and_delete_sessions() {
        let store = MemorySessionStore::new();
        store.save("a", &[ChatMessage::new(Role::User, "1")]).await.unwrap();
        store.save("b", &[]).await.unwrap();

        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"a".to_string()));

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());
        assert!(store.load("a").await.unwrap().is_none());
    }

    #[test]
    fn unknown_backend_is_rejected() {
        use clap::Parser;
        let args = Args::try_parse_from(["relay-console", "--history-type", "sqlite"]).unwrap();
        assert!(matches!(create_session_store(&args), Err(StoreError::UnsupportedBackend(_))));
    }
}
