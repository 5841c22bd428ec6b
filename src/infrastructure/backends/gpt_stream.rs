#[cfg(test)]
#[path = "gpt_stream_test.rs"]
mod tests;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;

use super::endpoint_url;
use super::into_byte_stream;
use crate::domain::models::Backend;
use crate::domain::models::BackendName;
use crate::domain::models::ByteStream;
use crate::domain::models::PromptRequest;
use crate::domain::models::StreamDecoder;
use crate::domain::services::decoders::RawTextDecoder;

/// Library-aware endpoint replying with unframed text chunks.
pub struct GptStream {
    url: String,
    client: reqwest::Client,
}

impl GptStream {
    pub fn new(base_url: &str, path: &str) -> GptStream {
        return GptStream {
            url: endpoint_url(base_url, path),
            client: reqwest::Client::new(),
        };
    }
}

#[async_trait]
impl Backend for GptStream {
    fn name(&self) -> BackendName {
        return BackendName::GptStream;
    }

    fn decoder(&self) -> Box<dyn StreamDecoder> {
        return Box::<RawTextDecoder>::default();
    }

    #[allow(clippy::implicit_return)]
    async fn open_stream(&self, request: &PromptRequest, bearer: &str) -> Result<ByteStream> {
        let res = self
            .client
            .post(&self.url)
            .bearer_auth(bearer)
            .json(request)
            .send()
            .await?;

        if !res.status().is_success() {
            tracing::error!(
                status = res.status().as_u16(),
                "Failed to make prompt request to the stream endpoint"
            );
            bail!(format!(
                "Stream request failed with status {}",
                res.status().as_u16()
            ));
        }

        return Ok(into_byte_stream(res));
    }
}
