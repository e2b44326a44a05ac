//! Core library for the BimbelKu tutoring client.
//!
//! This crate owns the session/authentication subsystem:
//! - `auth`: the credential store, its persistence backends, token renewal
//!   and the login/registration service
//! - `api`: the request gateway every authenticated call goes through
//! - `routing`: per-route role authorization, navigation and the landing decision
//! - `config`: user configuration (API base URL, timeouts, storage backend)
//!
//! [`BimbelClient`] is the composition root: it builds one credential store
//! and hands it to every component that needs it.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod routing;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use anyhow::Result;

pub use api::{ApiError, ApiResponse, RequestGateway};
pub use auth::{AuthService, ClearReason, CredentialStore, Session, SessionEvent, SessionId};
pub use config::Config;
pub use models::{Role, User};
pub use routing::{EntryRouter, Navigator, RouteGuard, RouteTable};

use api::{HttpTransport, ReqwestTransport};
use auth::{RenewalCoordinator, SessionPersistence};

/// Every session-aware component, wired to a single credential store.
pub struct BimbelClient {
    pub store: CredentialStore,
    pub gateway: RequestGateway,
    pub auth: AuthService,
    pub entry: EntryRouter,
    config: Config,
}

impl BimbelClient {
    /// Build a client talking to the configured API over reqwest.
    pub fn new(config: Config, persistence: Box<dyn SessionPersistence>) -> Result<Self> {
        let transport = ReqwestTransport::new(config.request_timeout())?;
        Self::with_transport(config, persistence, Arc::new(transport))
    }

    /// Build a client on top of an arbitrary transport.
    pub fn with_transport(
        config: Config,
        persistence: Box<dyn SessionPersistence>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self> {
        let store = CredentialStore::load(persistence)?;

        let renewal = RenewalCoordinator::new(
            store.clone(),
            transport.clone(),
            config.api_url.clone(),
            config.refresh_timeout(),
        );
        let gateway = RequestGateway::new(
            transport.clone(),
            store.clone(),
            renewal,
            config.api_url.clone(),
            config.request_timeout(),
        );
        let auth = AuthService::new(
            transport,
            store.clone(),
            gateway.clone(),
            config.api_url.clone(),
            config.request_timeout(),
        );
        let entry = EntryRouter::new(store.clone(), auth.clone(), config.verify_session_on_entry);

        Ok(Self {
            store,
            gateway,
            auth,
            entry,
            config,
        })
    }

    /// A navigator guarding routes with the default authorization table.
    pub fn navigator(&self) -> Navigator {
        Navigator::new(RouteGuard::new(self.store.clone(), RouteTable::default()))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
