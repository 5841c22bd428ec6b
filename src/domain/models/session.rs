use serde_derive::Deserialize;
use serde_derive::Serialize;

pub const SESSION_TOKEN_KEY: &str = "sessionToken";
pub const CONVERSATION_ID_KEY: &str = "conversationId";

/// Lifecycle of the server-side session. `Creating` doubles as the
/// reentrancy guard for session creation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionPhase {
    #[default]
    Idle,
    Creating,
    Created,
    Invalid,
    Failed,
    Destroyed,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    pub session_token: Option<String>,
    pub phase: SessionPhase,
    pub last_error: Option<String>,
    pub consecutive_validation_failures: u32,
}

impl SessionState {
    pub fn is_initializing(&self) -> bool {
        return self.phase == SessionPhase::Creating;
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokenResponse {
    pub session_token: String,
}
