pub mod api;
pub mod auth;
pub mod backends;
pub mod storage;
