#[cfg(test)]
#[path = "message_test.rs"]
mod tests;

use chrono::Local;
use chrono::SecondsFormat;
use serde_derive::Deserialize;
use serde_derive::Serialize;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum MessageType {
    #[default]
    Normal,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub text: String,
    pub is_from_assistant: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip)]
    mtype: MessageType,
}

pub fn now_timestamp() -> String {
    return Local::now().to_rfc3339_opts(SecondsFormat::Millis, false);
}

impl Message {
    pub fn new(is_from_assistant: bool, text: &str) -> Message {
        return Message {
            text: text.to_string(),
            is_from_assistant,
            icon_ref: None,
            timestamp: None,
            conversation_id: None,
            mtype: MessageType::Normal,
        };
    }

    /// Builds a synthetic assistant message shown in place of a failed reply.
    pub fn error(text: &str) -> Message {
        let mut msg = Message::new(true, text);
        msg.mtype = MessageType::Error;
        msg.timestamp = Some(now_timestamp());
        return msg;
    }

    pub fn user(text: &str, conversation_id: &str) -> Message {
        return Message::new(false, text).stamped(conversation_id);
    }

    pub fn assistant(text: &str, conversation_id: &str) -> Message {
        return Message::new(true, text).stamped(conversation_id);
    }

    fn stamped(mut self, conversation_id: &str) -> Message {
        self.conversation_id = Some(conversation_id.to_string());
        self.timestamp = Some(now_timestamp());
        return self;
    }

    pub fn is_error(&self) -> bool {
        return self.mtype == MessageType::Error;
    }

    /// Returns a copy with `delta` appended. Streamed replies are rebuilt
    /// rather than mutated so earlier snapshots stay intact.
    pub fn appended(&self, delta: &str) -> Message {
        let mut next = self.clone();
        next.text.push_str(delta);
        return next;
    }
}
