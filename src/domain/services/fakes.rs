use std::collections::VecDeque;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use super::decoders::RawTextDecoder;
use crate::domain::models::Backend;
use crate::domain::models::BackendName;
use crate::domain::models::ByteStream;
use crate::domain::models::PromptRequest;
use crate::domain::models::StreamDecoder;
use crate::domain::models::TokenProvider;

/// Fails the first `failures` calls, then hands out whatever token is set.
pub struct FlakyTokens {
    pub failures: u32,
    pub calls: AtomicU32,
    pub logouts: AtomicU32,
    token: Mutex<String>,
}

impl FlakyTokens {
    pub fn new(failures: u32) -> FlakyTokens {
        return FlakyTokens {
            failures,
            calls: AtomicU32::new(0),
            logouts: AtomicU32::new(0),
            token: Mutex::new("bearer-abc".to_string()),
        };
    }

    pub fn set_token(&self, token: &str) {
        *self.token.lock().unwrap() = token.to_string();
    }
}

#[async_trait]
impl TokenProvider for FlakyTokens {
    #[allow(clippy::implicit_return)]
    async fn get_token(&self) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            bail!("identity provider unavailable");
        }
        return Ok(self.token.lock().unwrap().to_string());
    }

    #[allow(clippy::implicit_return)]
    async fn logout(&self) -> Result<()> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        return Ok(());
    }
}

/// Holds the first token request until the returned sender fires or is
/// dropped. Later requests go straight through.
pub struct GatedTokens {
    pub calls: AtomicU32,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl GatedTokens {
    pub fn new() -> (GatedTokens, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let tokens = GatedTokens {
            calls: AtomicU32::new(0),
            gate: Mutex::new(Some(rx)),
        };
        return (tokens, tx);
    }

    /// Waits until the gated request is parked.
    pub async fn wait_for_first_call(&self) {
        while self.calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
    }
}

#[async_trait]
impl TokenProvider for GatedTokens {
    #[allow(clippy::implicit_return)]
    async fn get_token(&self) -> Result<String> {
        let gate = self.gate.lock().unwrap().take();
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        return Ok("bearer-abc".to_string());
    }
}

pub type ChunkSender = mpsc::UnboundedSender<Result<Vec<u8>>>;

/// Backend whose replies are fed by the test, one channel per request in
/// the order requests arrive. Dropping a sender ends that reply.
pub struct ChannelBackend {
    streams: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<Vec<u8>>>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ChannelBackend {
    pub fn with_streams(count: usize) -> (ChannelBackend, Vec<ChunkSender>) {
        let mut senders = vec![];
        let mut streams = VecDeque::new();
        for _ in 0..count {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            streams.push_back(rx);
        }

        let backend = ChannelBackend {
            streams: Mutex::new(streams),
            prompts: Mutex::new(vec![]),
        };
        return (backend, senders);
    }
}

#[async_trait]
impl Backend for ChannelBackend {
    fn name(&self) -> BackendName {
        return BackendName::GptStream;
    }

    fn decoder(&self) -> Box<dyn StreamDecoder> {
        return Box::<RawTextDecoder>::default();
    }

    #[allow(clippy::implicit_return)]
    async fn open_stream(&self, request: &PromptRequest, _bearer: &str) -> Result<ByteStream> {
        self.prompts.lock().unwrap().push(request.prompt.to_string());
        let Some(rx) = self.streams.lock().unwrap().pop_front() else {
            bail!("no scripted reply left");
        };

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            return rx.recv().await.map(|chunk| return (chunk, rx));
        });
        return Ok(stream.boxed());
    }
}
