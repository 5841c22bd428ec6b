pub mod conversation_store;
pub mod decoders;
#[cfg(test)]
pub mod fakes;
mod session_manager;
mod stream_controller;
pub mod tokens;

pub use conversation_store::*;
pub use session_manager::*;
pub use stream_controller::*;
