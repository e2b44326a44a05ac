use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;

use super::guard::{GuardDecision, RedirectReason, RouteGuard};
use super::routes::{self, normalize};
use crate::models::User;

/// Upper bound on redirect hops for one navigation. Any sane table settles
/// in two (role mismatch, then the role's own dashboard).
const MAX_REDIRECTS: usize = 4;

/// Where a navigation ended up and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub requested: String,
    pub landed: String,
    pub redirects: Vec<(String, RedirectReason)>,
}

impl Navigation {
    pub fn was_redirected(&self) -> bool {
        !self.redirects.is_empty()
    }
}

/// Identifies the view a pending request was issued for. Once the user
/// navigates elsewhere the handle goes stale and its updates are dropped.
#[derive(Debug, Clone)]
pub struct ViewHandle {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl ViewHandle {
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    /// Apply `update` only if the view is still mounted. Returns whether it ran.
    pub fn apply<T>(&self, value: T, update: impl FnOnce(T)) -> bool {
        if self.is_current() {
            update(value);
            true
        } else {
            false
        }
    }
}

/// Runs the route guard for each navigation and follows its redirects.
pub struct Navigator {
    guard: RouteGuard,
    current: Option<String>,
    generation: Arc<AtomicU64>,
    return_to: Option<String>,
}

impl Navigator {
    pub fn new(guard: RouteGuard) -> Self {
        Self {
            guard,
            current: None,
            generation: Arc::new(AtomicU64::new(0)),
            return_to: None,
        }
    }

    pub fn navigate(&mut self, path: &str) -> Navigation {
        let requested = normalize(path);
        let mut target = requested.clone();
        let mut redirects = Vec::new();
        let mut gave_up = false;

        loop {
            match self.guard.evaluate(&target) {
                GuardDecision::Authorized => break,
                GuardDecision::Redirect { to, reason } => {
                    if reason == RedirectReason::Unauthenticated && self.return_to.is_none() {
                        self.remember_return(&target);
                    }
                    redirects.push((to.clone(), reason));
                    if redirects.len() >= MAX_REDIRECTS {
                        warn!(requested = %requested, "Too many redirects, sending to login");
                        target = routes::LOGIN.to_string();
                        gave_up = true;
                        break;
                    }
                    target = to;
                }
            }
        }

        // The login page is for signing in; someone already signed in lands
        // on their dashboard instead
        if target == routes::LOGIN && !gave_up {
            if let Some(role) = self.guard.store().role() {
                let dashboard = role.dashboard_route().to_string();
                redirects.push((dashboard.clone(), RedirectReason::AlreadyAuthenticated { role }));
                target = dashboard;
            }
        }

        // Settle the guard on the final route so rendering follows it
        self.guard.navigate(&target);
        self.current = Some(target.clone());
        self.generation.fetch_add(1, Ordering::SeqCst);

        Navigation {
            requested,
            landed: target,
            redirects,
        }
    }

    fn remember_return(&mut self, path: &str) {
        let path = normalize(path);
        if path != routes::ROOT && !self.guard.table().is_public(&path) {
            self.return_to = Some(path);
        }
    }

    /// Where to go right after a successful login: the page that bounced the
    /// user to login, if their role may see it, else their dashboard.
    pub fn after_login(&mut self, user: &User) -> Navigation {
        let destination = match self.return_to.take() {
            Some(path) if self.guard.table().permits(&path, user.role) => path,
            _ => user.role.dashboard_route().to_string(),
        };
        self.navigate(&destination)
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn can_render(&self) -> bool {
        self.guard.can_render()
    }

    pub fn guard(&self) -> &RouteGuard {
        &self.guard
    }

    /// Handle for updates belonging to the view currently shown.
    pub fn view_handle(&self) -> ViewHandle {
        ViewHandle {
            generation: self.generation.load(Ordering::SeqCst),
            current: self.generation.clone(),
        }
    }
}
