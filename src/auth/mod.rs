//! Session handling: token cache, silent refresh and identity.
//!
//! A session is considered authenticated when it holds an access token that
//! has not expired. Neither a cached user nor a refresh token alone counts.

pub mod jwt;
pub mod monitor;
pub mod provider;
pub mod session;
pub mod signals;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::AppConfig;
use crate::logging::log_token_refresh;
use crate::model::UserInfo;
use provider::IdentityProvider;
use session::SessionStore;

pub use monitor::TokenMonitor;
pub use provider::{OAuthRefreshProvider, StaticTokenProvider, TokenGrant};
pub use signals::{Signal, SignalHub, SignalRecorder, Subscription};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("identity provider error: {0}")]
    Provider(String),
}

fn now_secs() -> i64 {
    Utc::now().timestamp()
}

pub struct AuthService {
    session: SessionStore,
    provider: Arc<dyn IdentityProvider>,
    signals: Arc<SignalHub>,
    refresh_threshold: Duration,
    // Serialises provider round trips between the monitor and requests.
    refresh_gate: tokio::sync::Mutex<()>,
}

impl AuthService {
    pub fn new(provider: Arc<dyn IdentityProvider>, config: &AppConfig) -> Self {
        Self::with_signals(provider, Arc::new(SignalHub::new()), config.token_refresh_threshold)
    }

    pub fn with_signals(
        provider: Arc<dyn IdentityProvider>,
        signals: Arc<SignalHub>,
        refresh_threshold: Duration,
    ) -> Self {
        Self {
            session: SessionStore::new(),
            provider,
            signals,
            refresh_threshold,
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn signals(&self) -> &Arc<SignalHub> {
        &self.signals
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Accept tokens handed over by the SSO callback.
    pub fn login_with_token(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<UserInfo, AuthError> {
        let user = jwt::decode_claims(access_token)?.user();
        self.session.store_access_token(access_token.to_string());
        self.session.store_refresh_token(refresh_token.map(str::to_string));
        self.set_user(Some(user.clone()));
        Ok(user)
    }

    pub fn current_user(&self) -> Option<UserInfo> {
        self.session.user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session
            .access_token()
            .map_or(false, |t| !jwt::is_expired(&t, now_secs()))
    }

    /// Cached token if unexpired, otherwise a silent refresh. `None` when
    /// no token can be obtained without user interaction.
    pub async fn token_silently(&self) -> Option<String> {
        if let Some(token) = self.session.access_token() {
            if !jwt::is_expired(&token, now_secs()) {
                return Some(token);
            }
        }
        self.refresh_silently("expired").await
    }

    /// Cached token unless it expires within the refresh threshold. A token
    /// that has not yet expired is still used when the refresh yields nothing.
    pub async fn refresh_if_needed(&self) -> Option<String> {
        let Some(token) = self.session.access_token() else {
            return self.token_silently().await;
        };
        let threshold = self.refresh_threshold.as_secs() as i64;
        if !jwt::expires_within(&token, now_secs(), threshold) {
            return Some(token);
        }
        match self.refresh_silently("expiring").await {
            Some(renewed) => Some(renewed),
            None if !jwt::is_expired(&token, now_secs()) => Some(token),
            None => None,
        }
    }

    /// Always goes to the identity provider.
    pub async fn refresh_silently(&self, trigger: &str) -> Option<String> {
        let _gate = self.refresh_gate.lock().await;
        let refresh_token = self.session.refresh_token();
        match self.provider.acquire_silent(refresh_token.as_deref()).await {
            Ok(Some(grant)) => {
                self.session.store_access_token(grant.access_token.clone());
                self.session.store_refresh_token(grant.refresh_token);
                let user = jwt::decode_claims(&grant.access_token).ok().map(|c| c.user());
                if user.is_some() && user != self.session.user() {
                    self.set_user(user);
                }
                log_token_refresh(trigger, "ok");
                Some(grant.access_token)
            }
            Ok(None) => {
                log_token_refresh(trigger, "no_session");
                None
            }
            Err(err) => {
                log_token_refresh(trigger, &err.to_string());
                None
            }
        }
    }

    /// Drop the cached access token; the refresh token is kept so a silent
    /// refresh can follow.
    pub fn invalidate_access_token(&self) {
        self.session.clear_access_token();
    }

    pub fn logout(&self) {
        self.session.clear();
        self.signals.emit(Signal::UserChanged { user: None });
    }

    /// Session teardown after an unrecoverable 401.
    pub(crate) fn fail_authentication(&self, message: &str) {
        self.logout();
        self.signals.emit(Signal::AuthenticationFailed {
            message: message.to_string(),
        });
    }

    fn set_user(&self, user: Option<UserInfo>) {
        self.session.set_user(user.clone());
        self.signals.emit(Signal::UserChanged { user });
    }
}
