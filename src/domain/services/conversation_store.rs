#[cfg(test)]
#[path = "conversation_store_test.rs"]
mod tests;

use anyhow::bail;
use anyhow::Result;

use crate::domain::models::create_conversation_id;
use crate::domain::models::ChatRecord;
use crate::domain::models::ConversationSummary;
use crate::domain::models::Message;

/// In-memory state of the active conversation and the list of past ones.
/// Messages are append-only; only the reply opened by
/// `begin_assistant_reply` grows while a response streams in.
#[derive(Default)]
pub struct ConversationStore {
    conversation_id: Option<String>,
    selected: Option<String>,
    messages: Vec<Message>,
    history: Vec<ConversationSummary>,
    is_loading: bool,
    /// Index of the streaming reply in `messages`.
    reply: Option<usize>,
    /// Conversation whose fetched messages have not been loaded yet.
    pending_load: Option<String>,
}

impl ConversationStore {
    pub fn new(conversation_id: Option<String>) -> ConversationStore {
        return ConversationStore {
            conversation_id: conversation_id.filter(|e| return !e.trim().is_empty()),
            ..ConversationStore::default()
        };
    }

    pub fn conversation_id(&self) -> Option<&str> {
        return self.conversation_id.as_deref();
    }

    pub fn selected(&self) -> Option<&str> {
        return self.selected.as_deref();
    }

    pub fn messages(&self) -> Vec<Message> {
        return self.messages.to_vec();
    }

    pub fn has_reply_in_progress(&self) -> bool {
        return self.reply.is_some();
    }

    pub fn history(&self) -> Vec<ConversationSummary> {
        return self.history.to_vec();
    }

    pub fn is_loading(&self) -> bool {
        return self.is_loading;
    }

    pub fn set_loading(&mut self, is_loading: bool) {
        self.is_loading = is_loading;
    }

    /// Returns the active conversation id, creating one if none is active.
    pub fn ensure_conversation_id(&mut self) -> String {
        if let Some(id) = &self.conversation_id {
            return id.to_string();
        }

        let id = create_conversation_id();
        self.conversation_id = Some(id.to_string());
        return id;
    }

    pub fn start_new_conversation(&mut self) -> String {
        let mut id = create_conversation_id();
        while Some(id.as_str()) == self.conversation_id.as_deref() {
            id = create_conversation_id();
        }

        self.conversation_id = Some(id.to_string());
        self.messages = vec![];
        self.selected = None;
        self.is_loading = false;
        self.reply = None;
        self.pending_load = None;
        return id;
    }

    /// Switches the id and clears the message list in one step. The caller
    /// fetches the conversation and hands it to `load_messages`.
    pub fn select_conversation(&mut self, summary: &ConversationSummary) {
        self.conversation_id = Some(summary.conversation_id.to_string());
        self.selected = Some(summary.conversation_id.to_string());
        self.messages = vec![];
        self.is_loading = false;
        self.reply = None;
        self.pending_load = Some(summary.conversation_id.to_string());
    }

    /// Puts the fetched messages in front of anything appended since the
    /// selection. Returns false, leaving state untouched, when the
    /// conversation is no longer current or was already loaded.
    pub fn load_messages(&mut self, conversation_id: &str, messages: Vec<Message>) -> bool {
        if self.conversation_id.as_deref() != Some(conversation_id)
            || self.pending_load.as_deref() != Some(conversation_id)
        {
            return false;
        }

        self.pending_load = None;
        self.reply = self.reply.map(|idx| return idx + messages.len());
        let appended = std::mem::replace(&mut self.messages, messages);
        self.messages.extend(appended);
        return true;
    }

    /// Appends a user message stamped with the current conversation. Blank
    /// input is ignored.
    pub fn append_user_message(&mut self, text: &str) -> Option<Message> {
        if text.trim().is_empty() {
            return None;
        }

        let id = self.ensure_conversation_id();
        let msg = Message::user(text, &id);
        self.messages.push(msg.clone());
        self.reply = None;
        return Some(msg);
    }

    pub fn begin_assistant_reply(&mut self) {
        let id = self.ensure_conversation_id();
        self.messages.push(Message::assistant("", &id));
        self.reply = Some(self.messages.len() - 1);
    }

    pub fn append_to_assistant_reply(&mut self, delta: &str) -> Result<()> {
        let Some(slot) = self.reply.and_then(|idx| return self.messages.get_mut(idx)) else {
            bail!("No assistant reply in progress to append to");
        };

        *slot = slot.appended(delta);
        return Ok(());
    }

    /// Closes the streaming reply and returns it.
    pub fn finish_assistant_reply(&mut self) -> Option<Message> {
        let idx = self.reply.take()?;
        return self.messages.get(idx).cloned();
    }

    /// Adds a synthetic error reply and closes any streaming reply. An
    /// empty trailing reply is replaced by the error.
    pub fn push_error(&mut self, text: &str) -> Message {
        let mut msg = Message::error(text);
        msg.conversation_id = self.conversation_id.clone();

        if let Some(idx) = self.reply.take() {
            let empty_tail = idx + 1 == self.messages.len()
                && self.messages.get(idx).map(|e| return e.text.is_empty()) == Some(true);
            if empty_tail {
                self.messages.pop();
            }
        }

        self.messages.push(msg.clone());
        return msg;
    }

    pub fn replace_history(&mut self, chats: &[ChatRecord]) {
        self.history = chats
            .iter()
            .map(ConversationSummary::from_record)
            .collect();
    }
}
