use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::AuthService;
use crate::logging::{log, obj, v_str, Domain, Level};

/// Periodically renews the session token so that a long-lived task pane
/// does not hit a 401 on the next user action.
///
/// Besides the fixed interval, [`TokenMonitor::poke`] triggers an immediate
/// check (the host calls it when the pane regains focus).
pub struct TokenMonitor {
    auth: Arc<AuthService>,
    period: Duration,
    wake: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TokenMonitor {
    pub fn new(auth: Arc<AuthService>, period: Duration) -> Self {
        Self {
            auth,
            period,
            wake: Arc::new(Notify::new()),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the background task. Calling it again while running is a no-op.
    pub fn start(&self) {
        let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if handle.as_ref().map_or(false, |h| !h.is_finished()) {
            return;
        }
        let auth = self.auth.clone();
        let wake = self.wake.clone();
        let period = self.period;
        *handle = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so a fresh login
            // is not refreshed straight away.
            ticker.tick().await;
            loop {
                let trigger = tokio::select! {
                    _ = ticker.tick() => "interval",
                    _ = wake.notified() => "focus",
                };
                if auth.is_authenticated() {
                    if auth.refresh_if_needed().await.is_none() {
                        log(
                            Level::Warn,
                            Domain::Auth,
                            "monitor_refresh_failed",
                            obj(&[("trigger", v_str(trigger))]),
                        );
                    }
                }
            }
        }));
        log(Level::Info, Domain::Auth, "monitor_started", obj(&[]));
    }

    pub fn poke(&self) {
        self.wake.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map_or(false, |h| !h.is_finished())
    }

    pub fn stop(&self) {
        if let Some(h) = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take() {
            h.abort();
            log(Level::Info, Domain::Auth, "monitor_stopped", obj(&[]));
        }
    }
}

impl Drop for TokenMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::provider::{IdentityProvider, TokenGrant};
    use crate::auth::{jwt, AuthError, SignalHub};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Renewer {
        calls: AtomicU32,
    }

    #[async_trait]
    impl IdentityProvider for Renewer {
        async fn acquire_silent(
            &self,
            _refresh: Option<&str>,
        ) -> Result<Option<TokenGrant>, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let exp = chrono::Utc::now().timestamp() + 3600;
            Ok(Some(TokenGrant::new(jwt::encode_unsigned(&json!({ "exp": exp, "sub": "u" })))))
        }
    }

    #[tokio::test]
    async fn test_poke_refreshes_expiring_token() {
        let provider = Arc::new(Renewer {
            calls: AtomicU32::new(0),
        });
        let auth = Arc::new(AuthService::with_signals(
            provider.clone(),
            Arc::new(SignalHub::new()),
            Duration::from_secs(300),
        ));
        let exp = chrono::Utc::now().timestamp() + 60;
        auth.login_with_token(&jwt::encode_unsigned(&json!({ "exp": exp, "sub": "u" })), None)
            .unwrap();

        let monitor = TokenMonitor::new(auth.clone(), Duration::from_secs(3600));
        monitor.start();
        monitor.start();
        assert!(monitor.is_running());

        monitor.poke();
        for _ in 0..50 {
            if provider.calls.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        monitor.stop();
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_unauthenticated_session_is_left_alone() {
        let provider = Arc::new(Renewer {
            calls: AtomicU32::new(0),
        });
        let auth = Arc::new(AuthService::with_signals(
            provider.clone(),
            Arc::new(SignalHub::new()),
            Duration::from_secs(300),
        ));
        let monitor = TokenMonitor::new(auth, Duration::from_secs(3600));
        monitor.start();
        monitor.poke();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
