use async_trait::async_trait;
use log::warn;
use std::io::ErrorKind;
use std::path::{ Path, PathBuf };

use crate::error::StoreError;
use crate::history::{ SessionMap, SessionStore };

/// All sessions in one JSON file, rewritten on every save.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load_all(&self) -> Result<SessionMap, StoreError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(SessionMap::new());
            }
            Err(e) => {
                return Err(e.into());
            }
        };

        if text.trim().is_empty() {
            warn!("Session file {} is empty, starting fresh", self.path.display());
            return Ok(SessionMap::new());
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn save_all(&self, sessions: &SessionMap) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(sessions)?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{ ChatMessage, Role };

    #[tokio::test]
    async fn sessions_survive_a_new_store_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sessions.json");

        let store = FileSessionStore::new(&path);
        store
            .save("s-1", &[
                ChatMessage::new(Role::System, "sys"),
                ChatMessage::new(Role::User, "hello"),
            ]).await
            .unwrap();

        let reopened = FileSessionStore::new(&path);
        let stored = reopened.load("s-1").await.unwrap().unwrap();
        assert_eq!(stored.messages[1].content, "hello");

        let raw: serde_json::Value = serde_json
            ::from_str(&std::fs::read_to_string(&path).unwrap())
            .unwrap();
        assert_eq!(raw["s-1"]["messages"][0]["role"], "system");
        assert!(raw["s-1"]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("none.json"));
        assert!(store.load_all().await.unwrap().is_empty());
        assert!(store.list().await.unwrap().is_empty());
    }
}
