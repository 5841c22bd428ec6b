use anyhow::bail;
use anyhow::Result;
use reqwest::StatusCode;

use super::join_url;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::SessionTokenResponse;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidateResult {
    Valid(String),
    Unauthorized,
    Rejected(u16),
}

pub struct SessionApi {
    url: String,
    client: reqwest::Client,
}

impl Default for SessionApi {
    fn default() -> SessionApi {
        return SessionApi::new(&Config::get(ConfigKey::ApiURL));
    }
}

impl SessionApi {
    pub fn new(url: &str) -> SessionApi {
        return SessionApi {
            url: url.to_string(),
            client: reqwest::Client::new(),
        };
    }

    pub async fn create(&self, bearer: &str) -> Result<String> {
        let res = self
            .client
            .post(join_url(&self.url, "/session"))
            .bearer_auth(bearer)
            .send()
            .await?;

        if !res.status().is_success() {
            tracing::error!(status = res.status().as_u16(), "Failed to create session");
            bail!(format!(
                "Session creation failed with status {}",
                res.status().as_u16()
            ));
        }

        let body = res.json::<SessionTokenResponse>().await?;
        return Ok(body.session_token);
    }

    pub async fn validate(&self, bearer: &str) -> Result<ValidateResult> {
        let res = self
            .client
            .post(join_url(&self.url, "/session/validate"))
            .bearer_auth(bearer)
            .send()
            .await?;

        if res.status() == StatusCode::UNAUTHORIZED {
            return Ok(ValidateResult::Unauthorized);
        }
        if !res.status().is_success() {
            return Ok(ValidateResult::Rejected(res.status().as_u16()));
        }

        let body = res.json::<SessionTokenResponse>().await?;
        return Ok(ValidateResult::Valid(body.session_token));
    }

    pub async fn delete(&self, bearer: &str) -> Result<()> {
        let res = self
            .client
            .delete(join_url(&self.url, "/session"))
            .bearer_auth(bearer)
            .send()
            .await?;

        if !res.status().is_success() {
            bail!(format!(
                "Session deletion failed with status {}",
                res.status().as_u16()
            ));
        }

        return Ok(());
    }
}
