#[cfg(test)]
#[path = "messages_test.rs"]
mod tests;

use anyhow::bail;
use anyhow::Result;

use super::join_url;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::ChatRecord;
use crate::domain::models::Message;

pub struct MessagesApi {
    url: String,
    client: reqwest::Client,
}

impl Default for MessagesApi {
    fn default() -> MessagesApi {
        return MessagesApi::new(&Config::get(ConfigKey::ApiURL));
    }
}

impl MessagesApi {
    pub fn new(url: &str) -> MessagesApi {
        return MessagesApi {
            url: url.to_string(),
            client: reqwest::Client::new(),
        };
    }

    pub async fn list(&self, bearer: &str, conversation_id: &str) -> Result<Vec<Message>> {
        let res = self
            .client
            .get(join_url(&self.url, "/messages"))
            .query(&[("conversationId", conversation_id)])
            .bearer_auth(bearer)
            .send()
            .await?;

        if !res.status().is_success() {
            tracing::error!(
                status = res.status().as_u16(),
                conversation_id = conversation_id,
                "Failed to fetch messages"
            );
            bail!(format!(
                "Fetching messages failed with status {}",
                res.status().as_u16()
            ));
        }

        return Ok(res.json::<Vec<Message>>().await?);
    }

    pub async fn chats(&self, bearer: &str) -> Result<Vec<ChatRecord>> {
        let res = self
            .client
            .get(join_url(&self.url, "/messages/chats"))
            .bearer_auth(bearer)
            .send()
            .await?;

        if !res.status().is_success() {
            tracing::error!(status = res.status().as_u16(), "Failed to fetch chats");
            bail!(format!(
                "Fetching chats failed with status {}",
                res.status().as_u16()
            ));
        }

        return Ok(res.json::<Vec<ChatRecord>>().await?);
    }

    pub async fn save(&self, bearer: &str, message: &Message) -> Result<()> {
        let res = self
            .client
            .post(join_url(&self.url, "/messages"))
            .bearer_auth(bearer)
            .json(message)
            .send()
            .await?;

        if !res.status().is_success() {
            bail!(format!(
                "Saving message failed with status {}",
                res.status().as_u16()
            ));
        }

        return Ok(());
    }
}
