//! Landing decision for the application root.
//!
//! Someone opening `/` with a stored session goes to their role's dashboard;
//! anyone else goes to login. With verification on, the stored session is
//! checked against the profile endpoint first, so a session the server no
//! longer honours never reaches a dashboard.

use tracing::{debug, info, warn};

use super::routes;
use crate::api::ApiError;
use crate::auth::{AuthService, ClearReason, CredentialStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryReason {
    /// Nothing stored.
    NoSession,
    /// The server confirmed the stored session.
    Verified,
    /// Verification is off; the stored session was taken as is.
    Trusted,
    /// The check failed; the session was discarded.
    VerificationFailed(String),
    /// The server could not be reached; the session is kept but unverified.
    Unreachable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDecision {
    pub destination: String,
    pub reason: EntryReason,
}

impl EntryDecision {
    fn login(reason: EntryReason) -> Self {
        Self {
            destination: routes::LOGIN.to_string(),
            reason,
        }
    }
}

#[derive(Clone)]
pub struct EntryRouter {
    store: CredentialStore,
    auth: AuthService,
    verify: bool,
}

impl EntryRouter {
    pub fn new(store: CredentialStore, auth: AuthService, verify: bool) -> Self {
        Self {
            store,
            auth,
            verify,
        }
    }

    pub async fn resolve(&self) -> EntryDecision {
        let (session, session_id) = self.store.snapshot();
        let Some(session) = session else {
            debug!("No stored session, entering at login");
            return EntryDecision::login(EntryReason::NoSession);
        };

        if !self.verify {
            return EntryDecision {
                destination: session.role().dashboard_route().to_string(),
                reason: EntryReason::Trusted,
            };
        }

        // The gateway renews an expired access token on the way; only a
        // session that cannot be recovered fails here.
        let failure = match self.auth.profile().await {
            Ok(profile) if profile.id == session.user.id && profile.role == session.role() => {
                info!(user_id = profile.id, role = %profile.role, "Stored session verified");
                return EntryDecision {
                    destination: profile.role.dashboard_route().to_string(),
                    reason: EntryReason::Verified,
                };
            }
            Ok(profile) => format!(
                "profile mismatch: stored user {} ({}), server user {} ({})",
                session.user.id,
                session.role(),
                profile.id,
                profile.role
            ),
            Err(ApiError::Network(message)) => {
                // The server never judged the session; keep it for the next launch
                warn!(error = %message, "Server unreachable, session kept unverified");
                return EntryDecision::login(EntryReason::Unreachable(message));
            }
            Err(e) => e.to_string(),
        };

        warn!(error = %failure, "Session verification failed, clearing session");
        self.store.clear_if(session_id, ClearReason::VerificationFailed);
        EntryDecision::login(EntryReason::VerificationFailed(failure))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;
    use crate::api::endpoints::{PROFILE_PATH, TOKEN_REFRESH_PATH};
    use crate::auth::SessionEvent;
    use crate::models::Role;
    use crate::testing::{fixture_session, fixture_user, test_client, MockTransport, Reply};
    use crate::BimbelClient;

    fn profile_backend(role: Role) -> Arc<MockTransport> {
        MockTransport::new(move |req| {
            if req.url.ends_with(PROFILE_PATH) {
                Reply::json(200, json!(fixture_user(role)))
            } else {
                Reply::json(404, json!({}))
            }
        })
    }

    fn unverified(client: &BimbelClient) -> EntryRouter {
        EntryRouter::new(client.store.clone(), client.auth.clone(), false)
    }

    #[tokio::test]
    async fn test_no_session_goes_to_login() {
        let transport = profile_backend(Role::Admin);
        let client = test_client(transport.clone(), None);

        let decision = client.entry.resolve().await;
        assert_eq!(decision.destination, "/login");
        assert_eq!(decision.reason, EntryReason::NoSession);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_verified_session_goes_to_role_dashboard() {
        let transport = profile_backend(Role::Siswa);
        let client = test_client(transport.clone(), Some(fixture_session("a1", "r1", Role::Siswa)));

        let decision = client.entry.resolve().await;
        assert_eq!(decision.destination, "/siswa-dashboard");
        assert_eq!(decision.reason, EntryReason::Verified);
        assert_eq!(transport.requests()[0].bearer.as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn test_unverified_mode_trusts_stored_role() {
        let transport = profile_backend(Role::Siswa);
        let client = test_client(transport.clone(), Some(fixture_session("a1", "r1", Role::Admin)));

        let decision = unverified(&client).resolve().await;
        assert_eq!(decision.destination, "/admin-dashboard");
        assert_eq!(decision.reason, EntryReason::Trusted);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_role_mismatch_clears_session() {
        let transport = profile_backend(Role::Siswa);
        let client = test_client(transport, Some(fixture_session("a1", "r1", Role::Admin)));
        let mut events = client.store.subscribe();

        let decision = client.entry.resolve().await;
        assert_eq!(decision.destination, "/login");
        assert!(matches!(decision.reason, EntryReason::VerificationFailed(_)));
        assert!(client.store.get().is_none());
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Cleared(ClearReason::VerificationFailed)
        );
    }

    #[tokio::test]
    async fn test_expired_access_token_is_renewed_during_verification() {
        let transport = MockTransport::new(|req| {
            if req.url.ends_with(TOKEN_REFRESH_PATH) {
                Reply::json(200, json!({"access": "a2"}))
            } else if req.bearer.as_deref() == Some("a2") {
                Reply::json(200, json!(fixture_user(Role::Admin)))
            } else {
                Reply::json(401, json!({"detail": "Token is invalid or expired"}))
            }
        });
        let client = test_client(transport.clone(), Some(fixture_session("a1", "r1", Role::Admin)));

        let decision = client.entry.resolve().await;
        assert_eq!(decision.reason, EntryReason::Verified);
        assert_eq!(decision.destination, "/admin-dashboard");
        assert_eq!(client.store.access_token().as_deref(), Some("a2"));
        assert_eq!(transport.count(TOKEN_REFRESH_PATH), 1);
    }

    #[tokio::test]
    async fn test_unrecoverable_session_goes_to_login() {
        let transport = MockTransport::new(|req| {
            if req.url.ends_with(TOKEN_REFRESH_PATH) {
                Reply::json(401, json!({"detail": "Token is blacklisted"}))
            } else {
                Reply::json(401, json!({"detail": "Token is invalid or expired"}))
            }
        });
        let client = test_client(transport, Some(fixture_session("a1", "r1", Role::Siswa)));

        let decision = client.entry.resolve().await;
        assert_eq!(decision.destination, "/login");
        assert!(matches!(decision.reason, EntryReason::VerificationFailed(_)));
        assert!(client.store.get().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_server_keeps_session() {
        let transport = MockTransport::new(|_| Reply::fail("connection refused"));
        let client = test_client(transport, Some(fixture_session("a1", "r1", Role::Siswa)));

        let decision = client.entry.resolve().await;
        assert_eq!(decision.destination, "/login");
        assert!(matches!(decision.reason, EntryReason::Unreachable(ref m) if m == "connection refused"));
        assert_eq!(client.store.get(), Some(fixture_session("a1", "r1", Role::Siswa)));
    }

    #[tokio::test]
    async fn test_failed_verification_spares_session_established_meanwhile() {
        let other_store: Arc<Mutex<Option<CredentialStore>>> = Arc::default();
        let relogin = other_store.clone();
        let transport = MockTransport::new(move |_| {
            if let Some(store) = relogin.lock().unwrap().as_ref() {
                store.clear(ClearReason::Logout);
                store.set(fixture_session("b1", "rb", Role::Siswa)).unwrap();
            }
            Reply::json(403, json!({"detail": "Akun dinonaktifkan"}))
        });
        let client = test_client(transport, Some(fixture_session("a1", "r1", Role::Admin)));
        *other_store.lock().unwrap() = Some(client.store.clone());

        let decision = client.entry.resolve().await;
        assert!(matches!(decision.reason, EntryReason::VerificationFailed(_)));
        assert_eq!(client.store.get(), Some(fixture_session("b1", "rb", Role::Siswa)));
    }
}
