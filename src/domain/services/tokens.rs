#[cfg(test)]
#[path = "tokens_test.rs"]
mod tests;

use std::time::Duration;

use anyhow::bail;
use anyhow::Result;

use crate::domain::models::TokenProvider;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        return RetryPolicy {
            attempts: 5,
            delay: Duration::from_millis(500),
        };
    }
}

/// Fetches a bearer token, retrying transient provider failures with a fixed
/// delay between attempts.
pub async fn acquire_token(
    provider: &(dyn TokenProvider + Send + Sync),
    policy: RetryPolicy,
) -> Result<String> {
    let attempts = policy.attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match provider.get_token().await {
            Ok(token) if !token.is_empty() => {
                return Ok(token);
            }
            Ok(_) => {
                tracing::warn!(attempt = attempt, "Token provider returned an empty token");
                last_err = Some("empty token".to_string());
            }
            Err(err) => {
                tracing::warn!(attempt = attempt, error = ?err, "Failed to fetch token");
                last_err = Some(err.to_string());
            }
        }

        if attempt < attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }

    bail!(format!(
        "Unable to obtain a token after {attempts} attempts: {}",
        last_err.unwrap_or_default()
    ))
}
