pub mod assistant;
pub mod gpt_stream;

use anyhow::Result;
use futures::StreamExt;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::BackendBox;
use crate::domain::models::BackendName;
use crate::domain::models::ByteStream;

pub struct BackendManager {}

impl BackendManager {
    pub fn get(name: BackendName) -> Result<BackendBox> {
        let url = Config::get(ConfigKey::ApiURL);
        return match name {
            BackendName::Assistant => Ok(Box::new(assistant::Assistant::new(
                &url,
                &Config::get(ConfigKey::AssistantPath),
            ))),
            BackendName::GptStream => Ok(Box::new(gpt_stream::GptStream::new(
                &url,
                &Config::get(ConfigKey::GptStreamPath),
            ))),
        };
    }
}

fn endpoint_url(base: &str, path: &str) -> String {
    return format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
}

fn into_byte_stream(res: reqwest::Response) -> ByteStream {
    return res
        .bytes_stream()
        .map(|chunk| {
            return chunk
                .map(|bytes| return bytes.to_vec())
                .map_err(anyhow::Error::from);
        })
        .boxed();
}
