#[cfg(test)]
#[path = "backend_test.rs"]
mod tests;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;

use super::PromptRequest;

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum BackendName {
    /// Server-sent `data: {"content": ...}` frames ending with `data: [DONE]`.
    Assistant,
    /// Raw text chunks with no framing.
    GptStream,
}

impl BackendName {
    pub fn parse(text: String) -> Option<BackendName> {
        return BackendName::iter().find(|e| return e.to_string() == text);
    }
}

/// Body chunks of a reply as they come off the wire.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// Turns raw body bytes into text deltas. Chunks are not line or character
/// aligned, so implementations buffer whatever is incomplete.
pub trait StreamDecoder: Send {
    fn feed(&mut self, bytes: &[u8]) -> Vec<String>;

    /// Flushes anything still buffered once the body has ended.
    fn finish(&mut self) -> Vec<String>;

    /// True once the stream signalled its own end, before the body closed.
    fn is_done(&self) -> bool {
        return false;
    }
}

#[async_trait]
pub trait Backend {
    fn name(&self) -> BackendName;

    /// A fresh decoder matching this backend's wire format, one per reply.
    fn decoder(&self) -> Box<dyn StreamDecoder>;

    /// Dispatches the prompt and resolves once response headers arrive.
    /// Non-success statuses are errors.
    async fn open_stream(&self, request: &PromptRequest, bearer: &str) -> Result<ByteStream>;
}

pub type BackendBox = Box<dyn Backend + Send + Sync>;
