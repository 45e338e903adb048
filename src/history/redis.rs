use async_trait::async_trait;
use log::error;
use redis::{ AsyncCommands, Client };

use crate::error::StoreError;
use crate::history::{ SessionMap, SessionStore };

/// Sessions kept as one JSON string under a single redis key.
pub struct RedisSessionStore {
    client: Client,
    key: String,
}

impl RedisSessionStore {
    pub fn new(host: &str, key: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::open(host)?,
            key: key.to_string(),
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load_all(&self) -> Result<SessionMap, StoreError> {
        let mut conn = self.get_connection().await?;
        let blob: Option<String> = conn.get(&self.key).await?;

        match blob {
            Some(json) =>
                serde_json::from_str(&json).map_err(|e| {
                    error!("Error parsing session blob at '{}': {}", self.key, e);
                    StoreError::from(e)
                }),
            None => Ok(SessionMap::new()),
        }
    }

    async fn save_all(&self, sessions: &SessionMap) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let json = serde_json::to_string(sessions)?;
        let _: () = conn.set(&self.key, json).await?;
        Ok(())
    }
}
