//! # Shared Auth State
//!
//! The auth state is owned by the identity provider and observed by everything
//! else. The owner holds an [`AuthProvider`]; observers hold an [`AuthWatch`].
//! Both sides sit on a `tokio::sync::watch` channel, so observers always see
//! the latest snapshot and are woken on every publish.
//!
//! Observers cannot write. The gate and the synced collection only ever read.

use crate::model::{AuthState, User};
use tokio::sync::watch;
use tracing::{debug, info};

/// Owner side of the auth state.
///
/// Starts unresolved (`loading = true`), matching a provider that has not yet
/// looked at its token storage.
#[derive(Debug)]
pub struct AuthProvider {
    sender: watch::Sender<AuthState>,
}

impl AuthProvider {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(AuthState::unresolved());
        Self { sender }
    }

    /// Creates a provider that is already resolved, e.g. from a restored session.
    pub fn resolved(user: Option<User>) -> Self {
        let (sender, _) = watch::channel(AuthState::resolved(user));
        Self { sender }
    }

    /// Returns a new read-only observer.
    pub fn watch(&self) -> AuthWatch {
        AuthWatch {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn current(&self) -> AuthState {
        self.sender.borrow().clone()
    }

    /// Finishes the initial session lookup.
    pub fn resolve(&self, user: Option<User>) {
        info!(user = ?user.as_ref().map(|u| &u.id), "Session resolved");
        self.sender.send_replace(AuthState::resolved(user));
    }

    pub fn sign_in(&self, user: User) {
        info!(user = %user.id, "Signed in");
        self.sender.send_replace(AuthState::resolved(Some(user)));
    }

    pub fn sign_out(&self) {
        info!("Signed out");
        self.sender.send_replace(AuthState::resolved(None));
    }

    /// Re-publishes the current user after a token refresh. Identity is unchanged.
    pub fn refresh_token(&self) {
        debug!("Token refreshed");
        self.sender.send_modify(|_| {});
    }
}

impl Default for AuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only observer of the auth state.
#[derive(Debug, Clone)]
pub struct AuthWatch {
    receiver: watch::Receiver<AuthState>,
}

impl AuthWatch {
    /// Snapshot of the latest published state.
    pub fn current(&self) -> AuthState {
        self.receiver.borrow().clone()
    }

    /// Snapshot of the latest state, marking it as seen.
    pub fn mark_seen(&mut self) -> AuthState {
        self.receiver.borrow_and_update().clone()
    }

    /// Waits for the next publish. Returns `None` once the provider is gone.
    pub async fn changed(&mut self) -> Option<AuthState> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}
