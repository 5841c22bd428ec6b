#[cfg(test)]
#[path = "conversation_test.rs"]
mod tests;

use chrono::DateTime;
use chrono::Local;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use uuid::Uuid;

const PREVIEW_MAX_CHARS: usize = 50;

pub fn create_conversation_id() -> String {
    return Uuid::new_v4().to_string();
}

/// A chat entry as returned by `GET /messages/chats`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    pub conversation_id: String,
    pub text: String,
    pub created_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub preview_text: String,
    pub created_at: String,
}

impl ConversationSummary {
    pub fn new(conversation_id: &str, preview_text: &str, created_at: &str) -> ConversationSummary {
        return ConversationSummary {
            conversation_id: conversation_id.to_string(),
            preview_text: preview_text.to_string(),
            created_at: created_at.to_string(),
        };
    }

    pub fn from_record(record: &ChatRecord) -> ConversationSummary {
        return ConversationSummary {
            conversation_id: record.conversation_id.to_string(),
            preview_text: preview(&record.text),
            created_at: format_created_at(&record.created_at),
        };
    }
}

pub fn preview(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= PREVIEW_MAX_CHARS {
        return text.to_string();
    }

    let cut: String = text.chars().take(PREVIEW_MAX_CHARS).collect();
    return format!("{cut}...");
}

/// Renders a server timestamp in local time. Values that are not RFC 3339
/// are shown as received.
pub fn format_created_at(created_at: &str) -> String {
    return match DateTime::parse_from_rfc3339(created_at) {
        Ok(date) => date
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        Err(_) => created_at.to_string(),
    };
}
