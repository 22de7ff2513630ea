//! Authentication collaborator contract.
//!
//! The workspace core never checks the session itself. The host shell treats
//! "no user" as an inactive workspace.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSnapshot {
    pub user: Option<User>,
    pub is_loading: bool,
}

impl AuthSnapshot {
    pub fn is_active(&self) -> bool {
        self.user.is_some() && !self.is_loading
    }
}

pub type AuthListener = Box<dyn Fn(&AuthSnapshot) + Send + Sync>;

/// Handle returned by `on_auth_state_changed`. Call `unsubscribe` to stop deliveries.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

pub trait AuthProvider: Send + Sync {
    /// Register a listener. It receives the current snapshot right away, then every change.
    fn on_auth_state_changed(&self, listener: AuthListener) -> Subscription;
    fn login(&self);
    fn logout(&self);
    fn snapshot(&self) -> AuthSnapshot;
}

type ListenerTable = Arc<Mutex<Vec<(u64, Arc<AuthListener>)>>>;

/// In-process provider that signs in a fixed local user.
pub struct LocalAuth {
    user: User,
    state: Mutex<AuthSnapshot>,
    listeners: ListenerTable,
    next_id: Mutex<u64>,
}

impl LocalAuth {
    pub fn new(user: User) -> Self {
        Self {
            user,
            state: Mutex::new(AuthSnapshot::default()),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_id: Mutex::new(0),
        }
    }

    fn publish(&self, snapshot: AuthSnapshot) {
        *self.state.lock().expect("auth state mutex") = snapshot.clone();
        // Snapshot the table so listeners may subscribe or unsubscribe re-entrantly.
        let listeners: Vec<Arc<AuthListener>> = self
            .listeners
            .lock()
            .expect("auth listeners mutex")
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(&snapshot);
        }
    }
}

impl AuthProvider for LocalAuth {
    fn on_auth_state_changed(&self, listener: AuthListener) -> Subscription {
        let id = {
            let mut next = self.next_id.lock().expect("auth id mutex");
            *next += 1;
            *next
        };
        let listener = Arc::new(listener);
        listener(&self.snapshot());
        self.listeners
            .lock()
            .expect("auth listeners mutex")
            .push((id, listener));

        let table = Arc::clone(&self.listeners);
        Subscription::new(move || {
            table
                .lock()
                .expect("auth listeners mutex")
                .retain(|(entry, _)| *entry != id);
        })
    }

    fn login(&self) {
        info!("Signed in as {}", self.user.display_name);
        self.publish(AuthSnapshot {
            user: Some(self.user.clone()),
            is_loading: false,
        });
    }

    fn logout(&self) {
        info!("Signed out");
        self.publish(AuthSnapshot::default());
    }

    fn snapshot(&self) -> AuthSnapshot {
        self.state.lock().expect("auth state mutex").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> LocalAuth {
        LocalAuth::new(User {
            id: "user-1".to_string(),
            display_name: "Alice".to_string(),
            email: None,
        })
    }

    #[test]
    fn test_listener_gets_current_then_changes() {
        let auth = local();
        let seen: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = auth.on_auth_state_changed(Box::new(move |snap: &AuthSnapshot| {
            sink.lock().unwrap().push(snap.is_active());
        }));

        auth.login();
        auth.logout();
        assert_eq!(*seen.lock().unwrap(), vec![false, true, false]);

        sub.unsubscribe();
        auth.login();
        assert_eq!(seen.lock().unwrap().len(), 3);
        assert!(auth.snapshot().is_active());
    }
}
