#[cfg(test)]
#[path = "session_manager_test.rs"]
mod tests;

use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use once_cell::sync::OnceCell;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use super::tokens::acquire_token;
use super::tokens::RetryPolicy;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Event;
use crate::domain::models::SessionPhase;
use crate::domain::models::SessionState;
use crate::domain::models::SharedStore;
use crate::domain::models::SharedTokenProvider;
use crate::domain::models::SESSION_TOKEN_KEY;
use crate::infrastructure::api::SessionApi;
use crate::infrastructure::api::ValidateResult;

static SESSION_MANAGER: OnceCell<Arc<SessionManager>> = OnceCell::new();

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to create session: {0}")]
    Create(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionSettings {
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
    pub max_failures: u32,
}

impl Default for SessionSettings {
    fn default() -> SessionSettings {
        return SessionSettings {
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_secs(300),
            max_failures: 5,
        };
    }
}

impl SessionSettings {
    pub fn from_config() -> Result<SessionSettings> {
        let settings = SessionSettings {
            retry: RetryPolicy {
                attempts: Config::get_u32(ConfigKey::TokenRetryAttempts)?,
                delay: Config::get_millis(ConfigKey::TokenRetryDelay)?,
            },
            poll_interval: Config::get_millis(ConfigKey::SessionPollInterval)?,
            max_failures: Config::get_u32(ConfigKey::SessionMaxFailures)?,
        };

        return settings.validate();
    }

    pub fn validate(self) -> Result<SessionSettings> {
        if self.poll_interval.is_zero() {
            bail!(format!(
                "config key '{}' must be greater than 0",
                ConfigKey::SessionPollInterval
            ));
        }
        if self.max_failures == 0 {
            bail!(format!(
                "config key '{}' must be greater than 0",
                ConfigKey::SessionMaxFailures
            ));
        }

        return Ok(self);
    }
}

struct Poller {
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

/// Owns the server-side session: creation, periodic validation and teardown.
/// One instance per process, see `SessionManager::install`.
pub struct SessionManager {
    api: SessionApi,
    tokens: SharedTokenProvider,
    local: SharedStore,
    tab: SharedStore,
    settings: SessionSettings,
    state: Mutex<SessionState>,
    poller: Mutex<Option<Poller>>,
    events: Option<mpsc::UnboundedSender<Event>>,
}

impl SessionManager {
    pub fn new(
        api: SessionApi,
        tokens: SharedTokenProvider,
        local: SharedStore,
        tab: SharedStore,
        settings: SessionSettings,
    ) -> SessionManager {
        return SessionManager {
            api,
            tokens,
            local,
            tab,
            settings,
            state: Mutex::new(SessionState::default()),
            poller: Mutex::new(None),
            events: None,
        };
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<Event>) -> SessionManager {
        self.events = Some(tx);
        return self;
    }

    /// Registers the process-wide manager. The first registration wins and
    /// later calls get it back unchanged.
    pub fn install(manager: SessionManager) -> Arc<SessionManager> {
        return SESSION_MANAGER.get_or_init(|| return Arc::new(manager)).clone();
    }

    pub fn installed() -> Option<Arc<SessionManager>> {
        return SESSION_MANAGER.get().cloned();
    }

    pub async fn state(&self) -> SessionState {
        return self.state.lock().await.clone();
    }

    fn emit(&self, event: Event) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Picks up a session token persisted by an earlier run.
    pub async fn restore(&self) -> Result<Option<String>> {
        let token = self.local.get(SESSION_TOKEN_KEY).await?;
        if let Some(token) = &token {
            let mut state = self.state.lock().await;
            if state.phase == SessionPhase::Idle {
                state.session_token = Some(token.to_string());
                state.phase = SessionPhase::Created;
            }
        }

        return Ok(token);
    }

    pub async fn create_session(&self) -> Result<(), SessionError> {
        {
            let mut state = self.state.lock().await;
            if state.is_initializing() {
                tracing::debug!("Session creation already in flight");
                return Ok(());
            }
            state.phase = SessionPhase::Creating;
            state.last_error = None;
        }

        let res = self.request_session().await;

        let mut state = self.state.lock().await;
        if state.phase == SessionPhase::Destroyed {
            tracing::warn!("Discarding a session created after teardown");
            return Err(SessionError::Create(
                "session was destroyed while it was being created".to_string(),
            ));
        }

        let res = match res {
            Ok(token) => {
                let stored = self.local.set(SESSION_TOKEN_KEY, &token).await;
                match stored {
                    Ok(()) => Ok(token),
                    Err(err) => Err(SessionError::Create(err.to_string())),
                }
            }
            Err(err) => Err(err),
        };

        return match res {
            Ok(token) => {
                tracing::debug!("Session created");
                state.session_token = Some(token);
                state.phase = SessionPhase::Created;
                state.consecutive_validation_failures = 0;
                self.emit(Event::SessionCreated());
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "Session creation failed");
                state.phase = SessionPhase::Failed;
                state.last_error = Some(err.to_string());
                self.emit(Event::SessionFailed(err.to_string()));
                Err(err)
            }
        };
    }

    async fn request_session(&self) -> Result<String, SessionError> {
        let bearer = acquire_token(self.tokens.as_ref(), self.settings.retry)
            .await
            .map_err(|e| return SessionError::Create(e.to_string()))?;

        return self
            .api
            .create(&bearer)
            .await
            .map_err(|e| return SessionError::Create(e.to_string()));
    }

    /// Manual retry from a failed or invalidated session.
    pub async fn retry_create(&self) -> Result<(), SessionError> {
        let phase = self.state.lock().await.phase;
        if !matches!(phase, SessionPhase::Failed | SessionPhase::Invalid) {
            tracing::debug!(phase = %phase, "Nothing to retry");
            return Ok(());
        }

        return self.create_session().await;
    }

    /// Never errors. Every failing check counts once against the session.
    pub async fn validate_session(&self) -> bool {
        return self.check_session().await.is_ok();
    }

    /// Returns the failure count on a failed check.
    async fn check_session(&self) -> Result<(), u32> {
        let outcome = self.check_remote().await;

        let mut state = self.state.lock().await;
        match outcome {
            Ok(()) => {
                state.consecutive_validation_failures = 0;
                state.phase = SessionPhase::Created;
                state.last_error = None;
                return Ok(());
            }
            Err(reason) => {
                state.consecutive_validation_failures += 1;
                let failures = state.consecutive_validation_failures;
                tracing::warn!(failures = failures, reason = %reason, "Session validation failed");
                if state.phase != SessionPhase::Destroyed {
                    state.phase = SessionPhase::Invalid;
                }
                state.last_error = Some(reason);
                self.emit(Event::SessionInvalid(failures));
                return Err(failures);
            }
        }
    }

    async fn check_remote(&self) -> Result<(), String> {
        let bearer = acquire_token(self.tokens.as_ref(), self.settings.retry)
            .await
            .map_err(|e| return e.to_string())?;

        let local = self
            .local
            .get(SESSION_TOKEN_KEY)
            .await
            .map_err(|e| return e.to_string())?;

        return match self.api.validate(&bearer).await {
            Ok(ValidateResult::Valid(token)) => {
                if local.as_deref() == Some(token.as_str()) {
                    Ok(())
                } else {
                    Err("session token mismatch".to_string())
                }
            }
            Ok(ValidateResult::Unauthorized) => Err("unauthorized".to_string()),
            Ok(ValidateResult::Rejected(status)) => Err(format!("rejected with status {status}")),
            Err(err) => Err(err.to_string()),
        };
    }

    /// Best effort teardown. Local state is cleared even when the server
    /// call fails.
    pub async fn destroy_session(&self) {
        self.stop_polling().await;

        match acquire_token(self.tokens.as_ref(), self.settings.retry).await {
            Ok(bearer) => {
                if let Err(err) = self.api.delete(&bearer).await {
                    tracing::warn!(error = ?err, "Failed to delete session");
                }
            }
            Err(err) => {
                tracing::warn!(error = ?err, "Skipping session delete without a token");
            }
        }

        {
            // Held across the clears; a create in flight must see Destroyed.
            let mut state = self.state.lock().await;
            if let Err(err) = self.local.clear().await {
                tracing::error!(error = ?err, "Failed to clear local store");
            }
            if let Err(err) = self.tab.clear().await {
                tracing::error!(error = ?err, "Failed to clear tab store");
            }

            state.session_token = None;
            state.phase = SessionPhase::Destroyed;
            state.consecutive_validation_failures = 0;
        }

        if let Err(err) = self.tokens.logout().await {
            tracing::warn!(error = ?err, "Identity logout failed");
        }

        self.emit(Event::NavigateToLanding());
    }

    pub async fn is_polling(&self) -> bool {
        return self.poller.lock().await.is_some();
    }

    /// Starts the periodic validation task unless one is already running.
    pub async fn start_polling(self: &Arc<Self>) {
        let mut poller = self.poller.lock().await;
        if poller.is_some() {
            return;
        }
        if self.settings.poll_interval.is_zero() {
            tracing::warn!("Session polling disabled by a zero poll interval");
            return;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            Arc::downgrade(self),
            cancel.clone(),
            self.settings.poll_interval,
            self.settings.max_failures,
        ));

        *poller = Some(Poller {
            cancel,
            _task: task,
        });
    }

    /// Cancels without awaiting the task, so the poller may stop itself.
    pub async fn stop_polling(&self) {
        if let Some(poller) = self.poller.lock().await.take() {
            poller.cancel.cancel();
        }
    }

    /// Follows the authentication state: signing in restores or creates a
    /// session and starts polling, signing out stops polling.
    pub async fn set_authenticated(
        self: &Arc<Self>,
        authenticated: bool,
    ) -> Result<(), SessionError> {
        if !authenticated {
            self.stop_polling().await;
            return Ok(());
        }

        let restored = self
            .restore()
            .await
            .map_err(|e| return SessionError::Create(e.to_string()))?;

        let res = match restored {
            Some(_) => Ok(()),
            None => self.create_session().await,
        };

        self.start_polling().await;
        return res;
    }
}

async fn poll_loop(
    manager: Weak<SessionManager>,
    cancel: CancellationToken,
    period: Duration,
    max_failures: u32,
) {
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                return;
            }
            _ = ticker.tick() => {}
        }

        let Some(manager) = manager.upgrade() else {
            return;
        };

        let failures = match manager.check_session().await {
            Ok(()) => continue,
            Err(failures) => failures,
        };

        if cancel.is_cancelled() {
            return;
        }

        if failures >= max_failures {
            tracing::warn!(failures = failures, "Too many failed validations, destroying session");
            manager.destroy_session().await;
            return;
        }
    }
}
