//! Observer registry for session-level notifications.
//!
//! The UI subscribes once and reacts to these by showing the login screen,
//! a permission notice or a connectivity banner.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::logging::log_signal;
use crate::model::UserInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Silent refresh failed; the session was cleared and the user has to
    /// log in again.
    AuthenticationFailed { message: String },
    AccessDenied { message: String },
    NetworkError { message: String },
    /// Login, logout or token renewal changed the current identity.
    UserChanged { user: Option<UserInfo> },
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Signal::AuthenticationFailed { .. } => "authentication_failed",
            Signal::AccessDenied { .. } => "access_denied",
            Signal::NetworkError { .. } => "network_error",
            Signal::UserChanged { .. } => "user_changed",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::AuthenticationFailed { message }
            | Signal::AccessDenied { message }
            | Signal::NetworkError { message } => write!(f, "{}: {}", self.name(), message),
            Signal::UserChanged { user: Some(u) } => write!(f, "user_changed: {}", u.email),
            Signal::UserChanged { user: None } => f.write_str("user_changed: signed out"),
        }
    }
}

type Observer = Arc<dyn Fn(&Signal) + Send + Sync>;

#[derive(Default)]
pub struct SignalHub {
    observers: Mutex<Vec<(u64, Observer)>>,
    next_id: Mutex<u64>,
}

/// Handle returned by [`SignalHub::subscribe`]; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription(u64);

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&Signal) + Send + Sync + 'static,
    {
        let id = {
            let mut next = self.next_id.lock().unwrap_or_else(|e| e.into_inner());
            *next += 1;
            *next
        };
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(observer)));
        Subscription(id)
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(id, _)| *id != subscription.0);
    }

    pub fn emit(&self, signal: Signal) {
        if !matches!(signal, Signal::UserChanged { .. }) {
            log_signal(signal.name(), &signal.to_string());
        }
        // Observers run outside the lock so they may subscribe or emit.
        let observers: Vec<Observer> = self
            .observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, o)| o.clone())
            .collect();
        for observer in observers {
            observer(&signal);
        }
    }
}

impl fmt::Debug for SignalHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.observers.lock().map(|o| o.len()).unwrap_or(0);
        f.debug_struct("SignalHub").field("observers", &n).finish()
    }
}

/// Records every signal it sees.
#[derive(Debug, Clone, Default)]
pub struct SignalRecorder {
    seen: Arc<Mutex<Vec<Signal>>>,
}

impl SignalRecorder {
    pub fn attach(hub: &SignalHub) -> Self {
        let recorder = Self::default();
        let seen = recorder.seen.clone();
        hub.subscribe(move |s| seen.lock().unwrap_or_else(|e| e.into_inner()).push(s.clone()));
        recorder
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.signals().iter().filter(|s| s.name() == name).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_all_observers() {
        let hub = SignalHub::new();
        let a = SignalRecorder::attach(&hub);
        let b = SignalRecorder::attach(&hub);
        hub.emit(Signal::NetworkError { message: "down".into() });
        assert_eq!(a.count("network_error"), 1);
        assert_eq!(b.count("network_error"), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let hub = SignalHub::new();
        let seen = Arc::new(Mutex::new(0));
        let counter = seen.clone();
        let sub = hub.subscribe(move |_| *counter.lock().unwrap() += 1);
        hub.emit(Signal::AccessDenied { message: "no".into() });
        hub.unsubscribe(sub);
        hub.emit(Signal::AccessDenied { message: "no".into() });
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
