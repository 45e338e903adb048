use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::history::{ SessionMap, SessionStore };

/// Keeps sessions for the lifetime of the process only.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<SessionMap>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load_all(&self) -> Result<SessionMap, StoreError> {
        Ok(self.sessions.lock().await.clone())
    }

    async fn save_all(&self, sessions: &SessionMap) -> Result<(), StoreError> {
        *self.sessions.lock().await = sessions.clone();
        Ok(())
    }
}
