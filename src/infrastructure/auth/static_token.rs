use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::models::TokenProvider;

pub struct StaticToken {
    token: RwLock<String>,
}

impl StaticToken {
    pub fn new(token: &str) -> StaticToken {
        return StaticToken {
            token: RwLock::new(token.trim().to_string()),
        };
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    #[allow(clippy::implicit_return)]
    async fn get_token(&self) -> Result<String> {
        let token = self.token.read().await;
        if token.is_empty() {
            bail!("No auth token configured. Set auth-token or auth-token-command.");
        }

        return Ok(token.to_string());
    }

    #[allow(clippy::implicit_return)]
    async fn logout(&self) -> Result<()> {
        self.token.write().await.clear();
        return Ok(());
    }
}
