//! Refresh-token exchange, one at a time.
//!
//! Calls that fail with 401 around the same moment all end up here with the
//! same stale access token. The first one starts the exchange; the rest await
//! the same shared future and get the same outcome.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Method;
use tracing::{debug, info, warn};

use super::store::{ClearReason, CredentialStore, SessionId};
use crate::api::endpoints::{RefreshRequest, RefreshResponse, TOKEN_REFRESH_PATH};
use crate::api::transport::join_url;
use crate::api::{HttpRequest, HttpTransport, RenewalError};

type RenewalFuture = Shared<BoxFuture<'static, Result<String, RenewalError>>>;

struct InFlight {
    id: u64,
    session: SessionId,
    stale_token: Option<String>,
    future: RenewalFuture,
}

struct Exchange {
    store: CredentialStore,
    transport: Arc<dyn HttpTransport>,
    refresh_url: String,
    timeout: Duration,
}

/// Clone is cheap; clones share the in-flight renewal.
#[derive(Clone)]
pub struct RenewalCoordinator {
    exchange: Arc<Exchange>,
    in_flight: Arc<Mutex<Option<InFlight>>>,
    next_id: Arc<AtomicU64>,
}

impl RenewalCoordinator {
    pub fn new(
        store: CredentialStore,
        transport: Arc<dyn HttpTransport>,
        api_url: String,
        timeout: Duration,
    ) -> Self {
        Self {
            exchange: Arc::new(Exchange {
                store,
                transport,
                refresh_url: join_url(&api_url, TOKEN_REFRESH_PATH),
                timeout,
            }),
            in_flight: Arc::new(Mutex::new(None)),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Get an access token newer than `stale_token`, the one the server just
    /// rejected, for the session `session` identifies. If another caller
    /// already replaced the token, the stored one is returned without
    /// contacting the server. If the session itself was replaced or cleared,
    /// the call fails with `SessionCleared` and the store is left alone.
    pub async fn renew(
        &self,
        stale_token: Option<&str>,
        session: SessionId,
    ) -> Result<String, RenewalError> {
        let (id, future) = {
            let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);

            let (current, current_id) = self.exchange.store.snapshot();
            if current_id != session {
                debug!("Session changed before renewal started");
                return Err(RenewalError::SessionCleared);
            }
            if let Some(current) = current {
                if stale_token != Some(current.access_token.as_str()) {
                    debug!("Access token already renewed by another call");
                    return Ok(current.access_token);
                }
            }

            match slot.as_ref() {
                Some(running)
                    if running.session == session
                        && running.stale_token.as_deref() == stale_token =>
                {
                    debug!("Joining in-flight token renewal");
                    (running.id, running.future.clone())
                }
                _ => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let future = self.exchange.clone().run(session).boxed().shared();
                    *slot = Some(InFlight {
                        id,
                        session,
                        stale_token: stale_token.map(str::to_string),
                        future: future.clone(),
                    });
                    (id, future)
                }
            }
        };

        let result = future.await;

        let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().map(|running| running.id) == Some(id) {
            *slot = None;
        }
        result
    }
}

impl Exchange {
    async fn run(self: Arc<Self>, session: SessionId) -> Result<String, RenewalError> {
        let result = self.exchange(session).await;
        match result {
            Ok(access) => {
                if self.store.replace_access_token(session, access.clone()) {
                    info!("Access token renewed");
                    Ok(access)
                } else {
                    debug!("Session cleared or replaced while renewal was in flight");
                    Err(RenewalError::SessionCleared)
                }
            }
            Err(RenewalError::SessionCleared) => Err(RenewalError::SessionCleared),
            Err(e) => {
                if self.store.clear_if(session, ClearReason::RenewalFailed) {
                    warn!(error = %e, "Token renewal failed, session cleared");
                } else {
                    warn!(error = %e, "Token renewal failed for a session that is already gone");
                }
                Err(e)
            }
        }
    }

    async fn exchange(&self, session: SessionId) -> Result<String, RenewalError> {
        let (current, current_id) = self.store.snapshot();
        if current_id != session {
            return Err(RenewalError::SessionCleared);
        }
        let refresh = current
            .and_then(|s| s.refresh_token)
            .ok_or(RenewalError::MissingRefreshToken)?;

        let body = serde_json::to_value(RefreshRequest { refresh: &refresh })
            .map_err(|e| RenewalError::Malformed(e.to_string()))?;
        let request = HttpRequest {
            method: Method::POST,
            url: self.refresh_url.clone(),
            bearer: None,
            body: Some(body),
        };

        debug!(url = %self.refresh_url, "Exchanging refresh token");
        let response = match tokio::time::timeout(self.timeout, self.transport.execute(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(RenewalError::Network(e.0)),
            Err(_) => {
                return Err(RenewalError::Network(format!(
                    "token refresh timed out after {}s",
                    self.timeout.as_secs()
                )))
            }
        };

        if !response.is_success() {
            return Err(RenewalError::Rejected {
                status: response.status,
            });
        }

        let parsed: RefreshResponse = serde_json::from_str(&response.body)
            .map_err(|e| RenewalError::Malformed(e.to_string()))?;
        match parsed.access {
            Some(access) if !access.is_empty() => Ok(access),
            _ => Err(RenewalError::Malformed("missing `access` field".to_string())),
        }
    }
}
