pub mod command;
pub mod static_token;

use std::sync::Arc;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::SharedTokenProvider;

pub struct TokenProviderManager {}

impl TokenProviderManager {
    /// A token command wins over a static token when both are configured.
    pub fn get() -> SharedTokenProvider {
        let token_command = Config::get(ConfigKey::AuthTokenCommand);
        if !token_command.trim().is_empty() {
            return Arc::new(command::CommandToken::new(&token_command));
        }

        return Arc::new(static_token::StaticToken::new(&Config::get(
            ConfigKey::AuthToken,
        )));
    }
}
