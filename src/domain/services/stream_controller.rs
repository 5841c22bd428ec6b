#[cfg(test)]
#[path = "stream_controller_test.rs"]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::time;
use tokio_util::sync::CancellationToken;

use super::conversation_store::ConversationStore;
use super::tokens::acquire_token;
use super::tokens::RetryPolicy;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::BackendBox;
use crate::domain::models::ByteStream;
use crate::domain::models::ConversationSummary;
use crate::domain::models::Event;
use crate::domain::models::Message;
use crate::domain::models::PromptOptions;
use crate::domain::models::PromptRequest;
use crate::domain::models::SharedStore;
use crate::domain::models::SharedTokenProvider;
use crate::domain::models::CONVERSATION_ID_KEY;
use crate::infrastructure::api::MessagesApi;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamSettings {
    pub retry: RetryPolicy,
    /// Longest wait between two body chunks. `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

impl Default for StreamSettings {
    fn default() -> StreamSettings {
        return StreamSettings {
            retry: RetryPolicy::default(),
            idle_timeout: Some(Duration::from_secs(120)),
        };
    }
}

impl StreamSettings {
    pub fn from_config() -> Result<StreamSettings> {
        let idle_timeout = Config::get_millis(ConfigKey::StreamIdleTimeout)?;
        return Ok(StreamSettings {
            retry: RetryPolicy {
                attempts: Config::get_u32(ConfigKey::TokenRetryAttempts)?,
                delay: Config::get_millis(ConfigKey::TokenRetryDelay)?,
            },
            idle_timeout: Some(idle_timeout).filter(|e| return !e.is_zero()),
        });
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PostOutcome {
    /// Blank prompt, nothing was sent.
    Ignored,
    Completed(Message),
    Failed(Message),
    /// A newer post or an abort took over before this one finished.
    Superseded,
}

enum StreamEnd {
    Completed { reply: Message, bearer: String },
    Superseded,
}

/// Sends prompts to a backend and grows the assistant reply in the store as
/// chunks arrive. At most one stream is live at a time; a new post cancels
/// the previous one.
pub struct StreamController {
    store: Arc<Mutex<ConversationStore>>,
    backend: BackendBox,
    messages: MessagesApi,
    tokens: SharedTokenProvider,
    tab: SharedStore,
    settings: StreamSettings,
    active: Mutex<Option<CancellationToken>>,
    events: Option<mpsc::UnboundedSender<Event>>,
}

impl StreamController {
    pub fn new(
        store: Arc<Mutex<ConversationStore>>,
        backend: BackendBox,
        messages: MessagesApi,
        tokens: SharedTokenProvider,
        tab: SharedStore,
        settings: StreamSettings,
    ) -> StreamController {
        return StreamController {
            store,
            backend,
            messages,
            tokens,
            tab,
            settings,
            active: Mutex::new(None),
            events: None,
        };
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<Event>) -> StreamController {
        self.events = Some(tx);
        return self;
    }

    pub fn store(&self) -> Arc<Mutex<ConversationStore>> {
        return self.store.clone();
    }

    fn emit(&self, event: Event) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Installs `next` as the live stream token and cancels the previous one.
    /// Callers hold the store lock.
    async fn supersede(&self, next: Option<CancellationToken>) {
        let mut active = self.active.lock().await;
        if let Some(previous) = std::mem::replace(&mut *active, next) {
            previous.cancel();
        }
    }

    /// The token of the live stream, for a "stop generating" control.
    pub async fn abort_handle(&self) -> Option<CancellationToken> {
        return self.active.lock().await.clone();
    }

    pub async fn abort(&self) {
        let mut store = self.store.lock().await;
        self.supersede(None).await;
        if store.is_loading() {
            store.set_loading(false);
            self.emit(Event::LoadingChanged(false));
        }
    }

    async fn remember_conversation(&self, conversation_id: &str) {
        if let Err(err) = self.tab.set(CONVERSATION_ID_KEY, conversation_id).await {
            tracing::warn!(error = ?err, "Failed to persist conversation id");
        }
    }

    pub async fn handle_post(&self, prompt: &str, options: &PromptOptions) -> PostOutcome {
        let cancel = CancellationToken::new();
        let user_message = {
            let mut store = self.store.lock().await;
            let Some(msg) = store.append_user_message(prompt) else {
                return PostOutcome::Ignored;
            };
            self.supersede(Some(cancel.clone())).await;
            store.set_loading(true);
            msg
        };
        self.emit(Event::LoadingChanged(true));

        let conversation_id = user_message.conversation_id.clone().unwrap_or_default();
        self.remember_conversation(&conversation_id).await;

        let res = self
            .stream_reply(&cancel, prompt, &conversation_id, options)
            .await;

        let (reply, bearer) = match res {
            Ok(StreamEnd::Completed { reply, bearer }) => (reply, bearer),
            Ok(StreamEnd::Superseded) => {
                tracing::debug!(conversation_id = %conversation_id, "Stream superseded");
                return PostOutcome::Superseded;
            }
            Err(err) => {
                tracing::error!(error = ?err, "Prompt request failed");
                let mut store = self.store.lock().await;
                if cancel.is_cancelled() {
                    return PostOutcome::Superseded;
                }
                store.set_loading(false);
                let msg = store.push_error(&format!("Sorry, something went wrong: {err}"));
                self.emit(Event::LoadingChanged(false));
                self.emit(Event::ReplyFailed(msg.clone()));
                return PostOutcome::Failed(msg);
            }
        };

        self.emit(Event::ReplyFinished(reply.clone()));
        self.persist(&bearer, &user_message, &reply).await;
        return PostOutcome::Completed(reply);
    }

    async fn stream_reply(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
        conversation_id: &str,
        options: &PromptOptions,
    ) -> Result<StreamEnd> {
        let bearer = acquire_token(self.tokens.as_ref(), self.settings.retry).await?;
        let request = PromptRequest::new(prompt, conversation_id, options);

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Ok(StreamEnd::Superseded);
            }
            res = self.backend.open_stream(&request, &bearer) => res?,
        };

        {
            let mut store = self.store.lock().await;
            if cancel.is_cancelled() {
                return Ok(StreamEnd::Superseded);
            }
            store.set_loading(false);
        }
        self.emit(Event::LoadingChanged(false));

        let mut decoder = self.backend.decoder();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Ok(StreamEnd::Superseded);
                }
                next = self.next_chunk(&mut stream) => next?,
            };

            let Some(chunk) = next else {
                break;
            };

            if !self.apply(cancel, decoder.feed(&chunk)).await? {
                return Ok(StreamEnd::Superseded);
            }
            if decoder.is_done() {
                break;
            }
        }

        if !self.apply(cancel, decoder.finish()).await? {
            return Ok(StreamEnd::Superseded);
        }

        let mut store = self.store.lock().await;
        if cancel.is_cancelled() {
            return Ok(StreamEnd::Superseded);
        }
        self.open_reply(&mut store);
        let Some(reply) = store.finish_assistant_reply() else {
            bail!("Assistant reply vanished from the conversation");
        };

        return Ok(StreamEnd::Completed { reply, bearer });
    }

    async fn next_chunk(&self, stream: &mut ByteStream) -> Result<Option<Vec<u8>>> {
        let next = match self.settings.idle_timeout {
            Some(limit) => match time::timeout(limit, stream.next()).await {
                Ok(next) => next,
                Err(_) => bail!(format!(
                    "No response data received for {} seconds",
                    limit.as_secs()
                )),
            },
            None => stream.next().await,
        };

        return next.transpose();
    }

    /// The reply bubble appears with the first delta.
    fn open_reply(&self, store: &mut ConversationStore) {
        if !store.has_reply_in_progress() {
            store.begin_assistant_reply();
            self.emit(Event::ReplyStarted());
        }
    }

    /// Appends deltas unless the stream was cancelled. Returns false once
    /// cancelled.
    async fn apply(&self, cancel: &CancellationToken, deltas: Vec<String>) -> Result<bool> {
        if deltas.is_empty() {
            return Ok(!cancel.is_cancelled());
        }

        let mut store = self.store.lock().await;
        if cancel.is_cancelled() {
            return Ok(false);
        }

        self.open_reply(&mut store);
        for delta in deltas {
            store.append_to_assistant_reply(&delta)?;
            self.emit(Event::ReplyDelta(delta));
        }

        return Ok(true);
    }

    async fn persist(&self, bearer: &str, user_message: &Message, reply: &Message) {
        for msg in [user_message, reply] {
            if let Err(err) = self.messages.save(bearer, msg).await {
                tracing::error!(error = ?err, "Failed to save message");
            }
        }

        if let Err(err) = self.refresh_with(bearer).await {
            tracing::error!(error = ?err, "Failed to refresh conversation history");
        }
    }

    pub async fn refresh_history(&self) -> Result<Vec<ConversationSummary>> {
        let bearer = acquire_token(self.tokens.as_ref(), self.settings.retry).await?;
        return self.refresh_with(&bearer).await;
    }

    async fn refresh_with(&self, bearer: &str) -> Result<Vec<ConversationSummary>> {
        let chats = self.messages.chats(bearer).await?;
        let history = {
            let mut store = self.store.lock().await;
            store.replace_history(&chats);
            store.history()
        };

        self.emit(Event::HistoryRefreshed(history.to_vec()));
        return Ok(history);
    }

    pub async fn start_new_conversation(&self) -> String {
        let id = {
            let mut store = self.store.lock().await;
            self.supersede(None).await;
            store.start_new_conversation()
        };

        self.remember_conversation(&id).await;
        self.emit(Event::ConversationChanged(id.to_string()));
        return id;
    }

    /// Switches to a past conversation and loads its messages. A load that
    /// finishes after another switch is dropped.
    pub async fn select_conversation(&self, summary: &ConversationSummary) -> Result<Vec<Message>> {
        {
            let mut store = self.store.lock().await;
            self.supersede(None).await;
            store.select_conversation(summary);
        }

        let id = summary.conversation_id.to_string();
        self.remember_conversation(&id).await;
        self.emit(Event::ConversationChanged(id.to_string()));

        let bearer = acquire_token(self.tokens.as_ref(), self.settings.retry).await?;
        let messages = self.messages.list(&bearer, &id).await?;

        let mut store = self.store.lock().await;
        if !store.load_messages(&id, messages.to_vec()) {
            tracing::debug!(conversation_id = %id, "Dropping messages for a stale or loaded selection");
            return Ok(vec![]);
        }

        self.emit(Event::MessagesLoaded(messages.to_vec()));
        return Ok(messages);
    }
}
