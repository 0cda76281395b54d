//! Session Context
//!
//! Auth state is passed explicitly to whoever needs an owner id. Observers
//! subscribe and get a `Subscription` guard; dropping the guard unsubscribes.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub user: Option<User>,
    pub is_loading: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self { user: None, is_loading: true }
    }
}

type Callback = Arc<dyn Fn(&AuthState) + Send + Sync>;

struct Inner {
    state: AuthState,
    next_id: u64,
    subscribers: Vec<(u64, Callback)>,
}

#[derive(Clone)]
pub struct SessionContext {
    inner: Arc<Mutex<Inner>>,
}

impl SessionContext {
    /// Starts in the loading state with no user.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: AuthState::default(),
                next_id: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking observer must not take the session down with it.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> AuthState {
        self.lock().state.clone()
    }

    pub fn owner_id(&self) -> Option<String> {
        self.lock().state.user.as_ref().map(|u| u.id.clone())
    }

    /// Register an observer. It is called once with the current state, then
    /// on every change until the returned guard is dropped.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AuthState) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        let (id, state) = {
            let mut inner = self.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, callback.clone()));
            (id, inner.state.clone())
        };
        callback(&state);
        Subscription { session: Arc::downgrade(&self.inner), id }
    }

    pub fn login(&self, user: User) {
        tracing::info!(user_id = %user.id, "session login");
        self.set(AuthState { user: Some(user), is_loading: false });
    }

    pub fn logout(&self) {
        tracing::info!("session logout");
        self.set(AuthState { user: None, is_loading: false });
    }

    fn set(&self, state: AuthState) {
        let callbacks: Vec<Callback> = {
            let mut inner = self.lock();
            inner.state = state.clone();
            inner.subscribers.iter().map(|(_, cb)| cb.clone()).collect()
        };
        // Called without the lock so observers may read the session.
        for callback in callbacks {
            callback(&state);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Subscription {
    session: std::sync::Weak<Mutex<Inner>>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.session.upgrade() {
            let mut inner = inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            inner.subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscribe_receives_current_then_changes() {
        let session = SessionContext::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = session.subscribe(move |state| {
            sink.lock().unwrap().push(state.user.as_ref().map(|u| u.id.clone()));
        });

        session.login(User { id: "u1".into(), email: None });
        session.logout();

        assert_eq!(*seen.lock().unwrap(), vec![None, Some("u1".to_string()), None]);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let session = SessionContext::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = session.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(session.subscriber_count(), 1);

        drop(sub);
        assert_eq!(session.subscriber_count(), 0);
        session.login(User { id: "u1".into(), email: None });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_can_read_session() {
        let session = SessionContext::new();
        let reader = session.clone();
        let owner = Arc::new(Mutex::new(None));
        let slot = owner.clone();
        let _sub = session.subscribe(move |_| {
            *slot.lock().unwrap() = reader.owner_id();
        });
        session.login(User { id: "u9".into(), email: None });
        assert_eq!(owner.lock().unwrap().as_deref(), Some("u9"));
    }
}
