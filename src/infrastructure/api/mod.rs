pub mod messages;
pub mod sessions;

pub use messages::MessagesApi;
pub use sessions::SessionApi;
pub use sessions::ValidateResult;

fn join_url(base: &str, path: &str) -> String {
    return format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
}
