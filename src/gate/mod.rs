//! # Access Gate
//!
//! Decides what a protected view renders, given the auth snapshot and the
//! process [`Mode`]. The decision is a pure function of three inputs; the
//! [`AccessGate`] type only binds it to a live [`AuthWatch`].
//!
//! Rules, first match wins:
//!
//! 1. auth still loading: [`GateDecision::RenderLoading`]
//! 2. demo mode: [`GateDecision::RenderChildren`]
//! 3. no user: [`GateDecision::RedirectToLogin`], replacing history
//! 4. otherwise: [`GateDecision::RenderChildren`]

use crate::auth::AuthWatch;
use crate::config::Mode;
use crate::model::{AuthState, User};

/// Route the gate redirects to when nobody is signed in.
pub const LOGIN_PATH: &str = "/login";

/// What a protected view should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Auth is unresolved. Neither protected nor public content may be shown.
    RenderLoading,
    /// The protected content may render.
    RenderChildren,
    /// Navigate to `to`. With `replace` set, the protected route is removed
    /// from history so back-navigation cannot return to it.
    RedirectToLogin { to: &'static str, replace: bool },
}

/// Pure gate decision.
pub fn decide(auth_loading: bool, user: Option<&User>, mode: Mode) -> GateDecision {
    if auth_loading {
        return GateDecision::RenderLoading;
    }
    if mode.is_demo() {
        return GateDecision::RenderChildren;
    }
    match user {
        None => GateDecision::RedirectToLogin {
            to: LOGIN_PATH,
            replace: true,
        },
        Some(_) => GateDecision::RenderChildren,
    }
}

/// Convenience over [`decide`] for a whole snapshot.
pub fn decide_for(state: &AuthState, mode: Mode) -> GateDecision {
    decide(state.loading, state.user.as_ref(), mode)
}

/// A gate bound to the shared auth state.
#[derive(Debug, Clone)]
pub struct AccessGate {
    auth: AuthWatch,
    mode: Mode,
}

impl AccessGate {
    pub fn new(auth: AuthWatch, mode: Mode) -> Self {
        Self { auth, mode }
    }

    /// Decision for the current auth snapshot.
    pub fn decision(&self) -> GateDecision {
        decide_for(&self.auth.current(), self.mode)
    }

    /// Waits for the next auth publish and returns the decision for it.
    /// Returns `None` once the auth provider is gone.
    pub async fn next_decision(&mut self) -> Option<GateDecision> {
        let state = self.auth.changed().await?;
        Some(decide_for(&state, self.mode))
    }
}
