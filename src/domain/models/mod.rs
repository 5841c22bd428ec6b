mod backend;
mod conversation;
mod event;
mod message;
mod prompt;
mod session;
mod slash_commands;
mod storage;
mod token;

pub use backend::*;
pub use conversation::*;
pub use event::*;
pub use message::*;
pub use prompt::*;
pub use session::*;
pub use slash_commands::*;
pub use storage::*;
pub use token::*;
