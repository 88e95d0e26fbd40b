use std::sync::Mutex;

use crate::model::UserInfo;

#[derive(Debug, Clone, Default)]
struct SessionState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<UserInfo>,
}

/// Session-scoped credential storage. Lives as long as the process and is
/// never persisted.
#[derive(Debug, Default)]
pub struct SessionStore {
    state: Mutex<SessionState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn access_token(&self) -> Option<String> {
        self.with(|s| s.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.with(|s| s.refresh_token.clone())
    }

    pub fn user(&self) -> Option<UserInfo> {
        self.with(|s| s.user.clone())
    }

    pub fn store_access_token(&self, token: String) {
        self.with(|s| s.access_token = Some(token));
    }

    /// Keeps the previous refresh token when the grant did not rotate it.
    pub fn store_refresh_token(&self, token: Option<String>) {
        if let Some(token) = token {
            self.with(|s| s.refresh_token = Some(token));
        }
    }

    pub fn set_user(&self, user: Option<UserInfo>) {
        self.with(|s| s.user = user);
    }

    pub fn clear_access_token(&self) {
        self.with(|s| s.access_token = None);
    }

    pub fn clear(&self) {
        self.with(|s| *s = SessionState::default());
    }

    pub fn is_empty(&self) -> bool {
        self.with(|s| s.access_token.is_none() && s.refresh_token.is_none() && s.user.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_token_survives_unrotated_grant() {
        let store = SessionStore::new();
        store.store_refresh_token(Some("r1".into()));
        store.store_refresh_token(None);
        assert_eq!(store.refresh_token().as_deref(), Some("r1"));
    }

    #[test]
    fn test_clear() {
        let store = SessionStore::new();
        store.store_access_token("a".into());
        store.store_refresh_token(Some("r".into()));
        store.clear_access_token();
        assert!(store.access_token().is_none());
        assert!(!store.is_empty());
        store.clear();
        assert!(store.is_empty());
    }
}
