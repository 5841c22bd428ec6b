use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

/// String key/value persistence, the stand-in for browser storage.
#[async_trait]
pub trait KeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

pub type SharedStore = Arc<dyn KeyValueStore + Send + Sync>;
