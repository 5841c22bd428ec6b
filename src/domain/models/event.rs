use super::ConversationSummary;
use super::Message;

/// Notifications pushed to the chat surface as state changes.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    ConversationChanged(String),
    HistoryRefreshed(Vec<ConversationSummary>),
    LoadingChanged(bool),
    MessagesLoaded(Vec<Message>),
    NavigateToLanding(),
    ReplyDelta(String),
    ReplyFailed(Message),
    ReplyFinished(Message),
    ReplyStarted(),
    SessionCreated(),
    SessionFailed(String),
    SessionInvalid(u32),
}
