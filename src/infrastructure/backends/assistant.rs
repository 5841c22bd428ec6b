#[cfg(test)]
#[path = "assistant_test.rs"]
mod tests;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use serde_derive::Serialize;

use super::endpoint_url;
use super::into_byte_stream;
use crate::domain::models::Backend;
use crate::domain::models::BackendName;
use crate::domain::models::ByteStream;
use crate::domain::models::PromptRequest;
use crate::domain::models::StreamDecoder;
use crate::domain::services::decoders::SseDecoder;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssistantRequest<'a> {
    prompt: &'a str,
    conversation_id: &'a str,
}

/// Assistant endpoint replying with `data: {"content": ...}` frames.
pub struct Assistant {
    url: String,
    client: reqwest::Client,
}

impl Assistant {
    pub fn new(base_url: &str, path: &str) -> Assistant {
        return Assistant {
            url: endpoint_url(base_url, path),
            client: reqwest::Client::new(),
        };
    }
}

#[async_trait]
impl Backend for Assistant {
    fn name(&self) -> BackendName {
        return BackendName::Assistant;
    }

    fn decoder(&self) -> Box<dyn StreamDecoder> {
        return Box::<SseDecoder>::default();
    }

    #[allow(clippy::implicit_return)]
    async fn open_stream(&self, request: &PromptRequest, bearer: &str) -> Result<ByteStream> {
        let req = AssistantRequest {
            prompt: &request.prompt,
            conversation_id: &request.conversation_id,
        };

        let res = self
            .client
            .post(&self.url)
            .bearer_auth(bearer)
            .header("Accept", "text/event-stream")
            .json(&req)
            .send()
            .await?;

        if !res.status().is_success() {
            tracing::error!(
                status = res.status().as_u16(),
                "Failed to make prompt request to the assistant"
            );
            bail!(format!(
                "Assistant request failed with status {}",
                res.status().as_u16()
            ));
        }

        return Ok(into_byte_stream(res));
    }
}
