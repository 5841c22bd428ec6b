#[cfg(test)]
#[path = "file_test.rs"]
mod tests;

use std::collections::BTreeMap;
use std::path;

use anyhow::Result;
use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::domain::models::KeyValueStore;

/// Key/value pairs kept as a JSON object in a single file.
pub struct FileStore {
    file_path: path::PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(file_path: path::PathBuf) -> FileStore {
        return FileStore {
            file_path,
            lock: Mutex::new(()),
        };
    }

    /// Survives restarts, like browser local storage.
    pub fn local(state_dir: &path::Path) -> FileStore {
        return FileStore::new(state_dir.join("local.json"));
    }

    /// Holds what a single chat surface resumes with, like tab storage.
    pub fn tab(state_dir: &path::Path) -> FileStore {
        return FileStore::new(state_dir.join("tab.json"));
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.file_path.exists() {
            return Ok(BTreeMap::new());
        }

        let payload = fs::read_to_string(&self.file_path).await?;
        if payload.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        return match serde_json::from_str(&payload) {
            Ok(entries) => Ok(entries),
            Err(err) => {
                tracing::warn!(error = ?err, path = ?self.file_path, "Discarding unreadable store file");
                Ok(BTreeMap::new())
            }
        };
    }

    async fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        let payload = serde_json::to_string_pretty(entries)?;
        let mut file = fs::File::create(&self.file_path).await?;
        file.write_all(payload.as_bytes()).await?;
        file.flush().await?;

        return Ok(());
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    #[allow(clippy::implicit_return)]
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        let entries = self.read_all().await?;
        return Ok(entries.get(key).cloned());
    }

    #[allow(clippy::implicit_return)]
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_all().await?;
        entries.insert(key.to_string(), value.to_string());
        return self.write_all(&entries).await;
    }

    #[allow(clippy::implicit_return)]
    async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        if !self.file_path.exists() {
            return Ok(());
        }

        fs::remove_file(&self.file_path).await?;
        return Ok(());
    }
}
