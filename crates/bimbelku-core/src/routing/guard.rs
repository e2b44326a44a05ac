//! Per-navigation authorization.
//!
//! Each navigation runs `Checking -> {Authorized, Redirecting}` against the
//! session in the credential store. Guarded content renders only while the
//! guard is `Authorized`.

use tracing::debug;

use super::routes::{self, normalize};
use super::table::RouteTable;
use crate::auth::CredentialStore;
use crate::models::Role;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectReason {
    /// No valid session.
    Unauthenticated,
    /// Authenticated, but the route is for other roles.
    RoleMismatch { role: Role },
    /// Authenticated user sent away from the login page.
    AlreadyAuthenticated { role: Role },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Authorized,
    Redirect { to: String, reason: RedirectReason },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Checking,
    Authorized,
    Redirecting { to: String, reason: RedirectReason },
}

pub struct RouteGuard {
    store: CredentialStore,
    table: RouteTable,
    state: GuardState,
}

impl RouteGuard {
    pub fn new(store: CredentialStore, table: RouteTable) -> Self {
        Self {
            store,
            table,
            state: GuardState::Checking,
        }
    }

    /// Decide `path` against the current session without touching guard state.
    pub fn evaluate(&self, path: &str) -> GuardDecision {
        let path = normalize(path);

        if self.table.is_public(&path) {
            return GuardDecision::Authorized;
        }

        // Read synchronously on every check; a session cleared since the
        // last navigation is seen here.
        let Some(role) = self.store.role() else {
            return GuardDecision::Redirect {
                to: routes::LOGIN.to_string(),
                reason: RedirectReason::Unauthenticated,
            };
        };

        if self.table.permits(&path, role) {
            GuardDecision::Authorized
        } else {
            GuardDecision::Redirect {
                to: role.dashboard_route().to_string(),
                reason: RedirectReason::RoleMismatch { role },
            }
        }
    }

    /// Run the state machine for a completed navigation to `path`.
    pub fn navigate(&mut self, path: &str) -> &GuardState {
        self.state = match self.evaluate(path) {
            GuardDecision::Authorized => GuardState::Authorized,
            GuardDecision::Redirect { to, reason } => {
                debug!(from = %path, to = %to, reason = ?reason, "Route guard redirecting");
                GuardState::Redirecting { to, reason }
            }
        };
        &self.state
    }

    pub fn state(&self) -> &GuardState {
        &self.state
    }

    pub fn can_render(&self) -> bool {
        self.state == GuardState::Authorized
    }

    /// Produce guarded content only when authorized.
    pub fn render<T>(&self, content: impl FnOnce() -> T) -> Option<T> {
        if self.can_render() {
            Some(content())
        } else {
            None
        }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }
}
