#[cfg(test)]
#[path = "command_test.rs"]
mod tests;

use std::process::Stdio;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::RwLock;

use crate::domain::models::TokenProvider;

/// Runs a shell command and uses its trimmed stdout as the bearer token.
pub struct CommandToken {
    command: String,
    logged_out: RwLock<bool>,
}

impl CommandToken {
    pub fn new(command: &str) -> CommandToken {
        return CommandToken {
            command: command.to_string(),
            logged_out: RwLock::new(false),
        };
    }
}

#[async_trait]
impl TokenProvider for CommandToken {
    #[allow(clippy::implicit_return)]
    async fn get_token(&self) -> Result<String> {
        if *self.logged_out.read().await {
            bail!("Logged out");
        }

        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(status = ?output.status, stderr = %stderr.trim(), "Token command failed");
            bail!(format!("Token command exited with {}", output.status));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            bail!("Token command returned no output");
        }

        return Ok(token);
    }

    #[allow(clippy::implicit_return)]
    async fn logout(&self) -> Result<()> {
        *self.logged_out.write().await = true;
        return Ok(());
    }
}
