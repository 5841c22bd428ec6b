use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;

use super::SessionError;
use super::SessionManager;
use super::SessionSettings;
use crate::domain::models::Event;
use crate::domain::models::SessionPhase;
use crate::domain::models::SharedStore;
use crate::domain::models::CONVERSATION_ID_KEY;
use crate::domain::models::SESSION_TOKEN_KEY;
use crate::domain::services::fakes::FlakyTokens;
use crate::domain::services::fakes::GatedTokens;
use crate::domain::services::tokens::RetryPolicy;
use crate::infrastructure::api::SessionApi;
use crate::infrastructure::storage::MemoryStore;

struct Harness {
    manager: Arc<SessionManager>,
    tokens: Arc<FlakyTokens>,
    local: SharedStore,
    tab: SharedStore,
    rx: mpsc::UnboundedReceiver<Event>,
}

fn settings(poll_interval: Duration) -> SessionSettings {
    return SessionSettings {
        retry: RetryPolicy {
            attempts: 2,
            delay: Duration::from_millis(1),
        },
        poll_interval,
        max_failures: 5,
    };
}

fn harness(url: &str, failures: u32, poll_interval: Duration) -> Harness {
    let tokens = Arc::new(FlakyTokens::new(failures));
    let local: SharedStore = Arc::new(MemoryStore::default());
    let tab: SharedStore = Arc::new(MemoryStore::default());
    let (tx, rx) = mpsc::unbounded_channel();

    let manager = SessionManager::new(
        SessionApi::new(url),
        tokens.clone(),
        local.clone(),
        tab.clone(),
        settings(poll_interval),
    )
    .with_events(tx);

    return Harness {
        manager: Arc::new(manager),
        tokens,
        local,
        tab,
        rx,
    };
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = vec![];
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    return events;
}

mod create {
    use super::*;

    #[tokio::test]
    async fn it_creates_and_persists_a_session() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/session")
            .match_header("Authorization", "Bearer bearer-abc")
            .with_status(200)
            .with_body(r#"{"sessionToken":"s-1"}"#)
            .create_async()
            .await;

        let mut h = harness(&server.url(), 0, Duration::from_secs(60));
        h.manager.create_session().await?;
        mock.assert_async().await;

        let state = h.manager.state().await;
        assert_eq!(state.phase, SessionPhase::Created);
        assert_eq!(state.session_token, Some("s-1".to_string()));
        assert_eq!(state.consecutive_validation_failures, 0);
        assert_eq!(h.local.get(SESSION_TOKEN_KEY).await?, Some("s-1".to_string()));
        assert_eq!(drain(&mut h.rx), vec![Event::SessionCreated()]);
        return Ok(());
    }

    #[tokio::test]
    async fn it_fails_on_a_server_error() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/session")
            .with_status(500)
            .create_async()
            .await;

        let h = harness(&server.url(), 0, Duration::from_secs(60));
        let res = h.manager.create_session().await;
        assert!(matches!(res, Err(SessionError::Create(_))));

        let state = h.manager.state().await;
        assert_eq!(state.phase, SessionPhase::Failed);
        assert!(state.last_error.is_some());
        assert_eq!(h.local.get(SESSION_TOKEN_KEY).await?, None);
        return Ok(());
    }

    #[tokio::test]
    async fn it_fails_when_no_token_can_be_obtained() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/session")
            .expect(0)
            .create_async()
            .await;

        let h = harness(&server.url(), 10, Duration::from_secs(60));
        let res = h.manager.create_session().await;
        assert!(matches!(res, Err(SessionError::Create(_))));
        assert_eq!(h.tokens.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.manager.state().await.phase, SessionPhase::Failed);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn it_ignores_overlapping_calls() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/session")
            .with_status(200)
            .with_body(r#"{"sessionToken":"s-1"}"#)
            .expect(1)
            .create_async()
            .await;

        let h = harness(&server.url(), 0, Duration::from_secs(60));
        let (first, second) = tokio::join!(h.manager.create_session(), h.manager.create_session());
        first?;
        second?;

        mock.assert_async().await;
        assert_eq!(h.manager.state().await.phase, SessionPhase::Created);
        return Ok(());
    }

    #[tokio::test]
    async fn it_retries_after_a_failure() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let _rejected = server
            .mock("POST", "/session")
            .match_header("Authorization", "Bearer expired")
            .with_status(403)
            .create_async()
            .await;
        let _accepted = server
            .mock("POST", "/session")
            .match_header("Authorization", "Bearer bearer-abc")
            .with_status(200)
            .with_body(r#"{"sessionToken":"s-2"}"#)
            .create_async()
            .await;

        let h = harness(&server.url(), 0, Duration::from_secs(60));
        h.tokens.set_token("expired");
        assert!(h.manager.create_session().await.is_err());

        h.tokens.set_token("bearer-abc");
        h.manager.retry_create().await?;
        assert_eq!(h.manager.state().await.phase, SessionPhase::Created);
        assert_eq!(h.local.get(SESSION_TOKEN_KEY).await?, Some("s-2".to_string()));
        return Ok(());
    }
}

mod validate {
    use super::*;

    #[tokio::test]
    async fn it_counts_each_unauthorized_check_once() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/session/validate")
            .with_status(401)
            .expect(3)
            .create_async()
            .await;

        let h = harness(&server.url(), 0, Duration::from_secs(60));
        h.local.set(SESSION_TOKEN_KEY, "s-1").await?;

        for expected in 1..=3 {
            assert!(!h.manager.validate_session().await);
            let state = h.manager.state().await;
            assert_eq!(state.consecutive_validation_failures, expected);
            assert_eq!(state.phase, SessionPhase::Invalid);
        }

        mock.assert_async().await;
        return Ok(());
    }

    #[tokio::test]
    async fn it_rejects_a_mismatched_session_token() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/session/validate")
            .with_status(200)
            .with_body(r#"{"sessionToken":"s-2"}"#)
            .create_async()
            .await;

        let h = harness(&server.url(), 0, Duration::from_secs(60));
        h.local.set(SESSION_TOKEN_KEY, "s-1").await?;

        assert!(!h.manager.validate_session().await);
        assert_eq!(h.manager.state().await.consecutive_validation_failures, 1);
        return Ok(());
    }

    #[tokio::test]
    async fn it_fails_without_a_local_token() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/session/validate")
            .with_status(200)
            .with_body(r#"{"sessionToken":"s-1"}"#)
            .create_async()
            .await;

        let h = harness(&server.url(), 0, Duration::from_secs(60));
        assert!(!h.manager.validate_session().await);
        assert_eq!(h.manager.state().await.consecutive_validation_failures, 1);
    }

    #[tokio::test]
    async fn it_counts_token_failures() {
        let server = mockito::Server::new_async().await;
        let h = harness(&server.url(), 10, Duration::from_secs(60));
        assert!(!h.manager.validate_session().await);
        assert_eq!(h.manager.state().await.consecutive_validation_failures, 1);
    }

    #[tokio::test]
    async fn it_resets_the_counter_on_success() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let _unauthorized = server
            .mock("POST", "/session/validate")
            .match_header("Authorization", "Bearer expired")
            .with_status(401)
            .create_async()
            .await;
        let _valid = server
            .mock("POST", "/session/validate")
            .match_header("Authorization", "Bearer bearer-abc")
            .with_status(200)
            .with_body(r#"{"sessionToken":"s-1"}"#)
            .create_async()
            .await;

        let h = harness(&server.url(), 0, Duration::from_secs(60));
        h.local.set(SESSION_TOKEN_KEY, "s-1").await?;

        h.tokens.set_token("expired");
        assert!(!h.manager.validate_session().await);
        assert!(!h.manager.validate_session().await);
        assert_eq!(h.manager.state().await.consecutive_validation_failures, 2);

        h.tokens.set_token("bearer-abc");
        assert!(h.manager.validate_session().await);
        let state = h.manager.state().await;
        assert_eq!(state.consecutive_validation_failures, 0);
        assert_eq!(state.phase, SessionPhase::Created);
        return Ok(());
    }
}

mod destroy {
    use super::*;

    #[tokio::test]
    async fn it_clears_local_state_even_when_delete_fails() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/session")
            .with_status(500)
            .create_async()
            .await;

        let mut h = harness(&server.url(), 0, Duration::from_secs(60));
        h.local.set(SESSION_TOKEN_KEY, "s-1").await?;
        h.tab.set(CONVERSATION_ID_KEY, "abc").await?;

        h.manager.destroy_session().await;
        mock.assert_async().await;

        assert_eq!(h.local.get(SESSION_TOKEN_KEY).await?, None);
        assert_eq!(h.tab.get(CONVERSATION_ID_KEY).await?, None);
        let state = h.manager.state().await;
        assert_eq!(state.phase, SessionPhase::Destroyed);
        assert_eq!(state.session_token, None);
        assert_eq!(h.tokens.logouts.load(Ordering::SeqCst), 1);
        assert_eq!(drain(&mut h.rx), vec![Event::NavigateToLanding()]);
        return Ok(());
    }

    #[tokio::test]
    async fn it_destroys_once_after_repeated_poll_failures() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let _validate = server
            .mock("POST", "/session/validate")
            .with_status(401)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/session")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let mut h = harness(&server.url(), 0, Duration::from_millis(10));
        h.local.set(SESSION_TOKEN_KEY, "s-1").await?;
        h.manager.start_polling().await;

        tokio::time::timeout(Duration::from_secs(5), async {
            while h.manager.state().await.phase != SessionPhase::Destroyed {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await?;
        tokio::time::sleep(Duration::from_millis(100)).await;

        delete.assert_async().await;
        assert!(!h.manager.is_polling().await);
        assert_eq!(h.local.get(SESSION_TOKEN_KEY).await?, None);

        let landings = drain(&mut h.rx)
            .into_iter()
            .filter(|e| return *e == Event::NavigateToLanding())
            .count();
        assert_eq!(landings, 1);
        return Ok(());
    }

    #[tokio::test]
    async fn it_discards_a_session_created_after_teardown() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let _create = server
            .mock("POST", "/session")
            .with_status(200)
            .with_body(r#"{"sessionToken":"s-1"}"#)
            .create_async()
            .await;
        let _delete = server
            .mock("DELETE", "/session")
            .with_status(200)
            .create_async()
            .await;

        let (tokens, release) = GatedTokens::new();
        let tokens = Arc::new(tokens);
        let local: SharedStore = Arc::new(MemoryStore::default());
        let manager = Arc::new(SessionManager::new(
            SessionApi::new(&server.url()),
            tokens.clone(),
            local.clone(),
            Arc::new(MemoryStore::default()),
            settings(Duration::from_secs(60)),
        ));

        let creating = manager.clone();
        let create = tokio::spawn(async move {
            return creating.create_session().await;
        });
        tokio::time::timeout(Duration::from_secs(5), tokens.wait_for_first_call()).await?;
        assert_eq!(manager.state().await.phase, SessionPhase::Creating);

        manager.destroy_session().await;
        let _ = release.send(());

        assert!(matches!(create.await?, Err(SessionError::Create(_))));
        let state = manager.state().await;
        assert_eq!(state.phase, SessionPhase::Destroyed);
        assert_eq!(state.session_token, None);
        assert_eq!(local.get(SESSION_TOKEN_KEY).await?, None);
        return Ok(());
    }
}

mod polling {
    use super::*;

    #[tokio::test]
    async fn it_starts_and_stops_idempotently() {
        let server = mockito::Server::new_async().await;
        let h = harness(&server.url(), 0, Duration::from_secs(3600));

        h.manager.start_polling().await;
        h.manager.start_polling().await;
        assert!(h.manager.is_polling().await);

        h.manager.stop_polling().await;
        h.manager.stop_polling().await;
        assert!(!h.manager.is_polling().await);
    }

    #[tokio::test]
    async fn it_follows_the_authentication_state() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let create = server
            .mock("POST", "/session")
            .expect(0)
            .create_async()
            .await;

        let h = harness(&server.url(), 0, Duration::from_secs(3600));
        h.local.set(SESSION_TOKEN_KEY, "s-1").await?;

        h.manager.set_authenticated(true).await?;
        assert!(h.manager.is_polling().await);
        assert_eq!(h.manager.state().await.phase, SessionPhase::Created);

        h.manager.set_authenticated(false).await?;
        assert!(!h.manager.is_polling().await);
        create.assert_async().await;
        return Ok(());
    }

    #[tokio::test]
    async fn it_creates_a_session_on_sign_in_when_none_is_stored() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let create = server
            .mock("POST", "/session")
            .with_status(200)
            .with_body(r#"{"sessionToken":"s-9"}"#)
            .expect(1)
            .create_async()
            .await;

        let h = harness(&server.url(), 0, Duration::from_secs(3600));
        h.manager.set_authenticated(true).await?;
        create.assert_async().await;
        assert_eq!(h.local.get(SESSION_TOKEN_KEY).await?, Some("s-9".to_string()));

        h.manager.stop_polling().await;
        return Ok(());
    }

    #[tokio::test]
    async fn it_does_not_poll_with_a_zero_interval() {
        let server = mockito::Server::new_async().await;
        let h = harness(&server.url(), 0, Duration::ZERO);

        h.manager.start_polling().await;
        assert!(!h.manager.is_polling().await);
    }

    #[test]
    fn it_rejects_settings_that_would_never_poll_or_never_destroy() {
        assert!(settings(Duration::ZERO).validate().is_err());
        assert!(SessionSettings {
            max_failures: 0,
            ..settings(Duration::from_secs(1))
        }
        .validate()
        .is_err());
        assert!(settings(Duration::from_secs(1)).validate().is_ok());
    }
}
