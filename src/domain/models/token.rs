use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

/// Source of short-lived identity bearer tokens. Failures are expected to be
/// transient and callers retry.
#[async_trait]
pub trait TokenProvider {
    async fn get_token(&self) -> Result<String>;

    /// Ends the identity session. Providers without one have nothing to do.
    #[allow(clippy::implicit_return)]
    async fn logout(&self) -> Result<()> {
        return Ok(());
    }
}

pub type SharedTokenProvider = Arc<dyn TokenProvider + Send + Sync>;
