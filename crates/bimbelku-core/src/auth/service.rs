//! Login, registration and logout.
//!
//! Login and registration talk to the auth service directly: a 401 there
//! means bad credentials, not an expired token, so they must not go through
//! the gateway's renew-and-replay path.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use tracing::{info, warn};

use super::session::Session;
use super::store::{ClearReason, CredentialStore};
use crate::api::endpoints::{LoginRequest, TokenPair, LOGIN_PATH, PROFILE_PATH, REGISTER_PATH};
use crate::api::transport::join_url;
use crate::api::{ApiError, FieldErrors, HttpRequest, HttpResponse, HttpTransport, RequestGateway};
use crate::models::{RegisterRequest, User};

/// Clone is cheap; clones share the transport and the store.
#[derive(Clone)]
pub struct AuthService {
    transport: Arc<dyn HttpTransport>,
    store: CredentialStore,
    gateway: RequestGateway,
    base_url: String,
    timeout: Duration,
}

impl AuthService {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: CredentialStore,
        gateway: RequestGateway,
        base_url: String,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            gateway,
            base_url,
            timeout,
        }
    }

    /// Authenticate and store the resulting session.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let email = email.trim();
        let mut errors = FieldErrors::new();
        if email.is_empty() {
            errors.add("email", "Email tidak boleh kosong");
        }
        if password.is_empty() {
            errors.add("password", "Password tidak boleh kosong");
        }
        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }

        let response = self
            .post_unauthenticated(LOGIN_PATH, &LoginRequest { email, password })
            .await?;
        let user = self.establish(response)?;
        info!(user_id = user.id, role = %user.role, "Login successful");
        Ok(user)
    }

    /// Create an account and store the resulting session. Form checks run
    /// first so obviously bad input never reaches the server.
    pub async fn register(&self, request: &RegisterRequest) -> Result<User, ApiError> {
        request.validate().map_err(ApiError::Validation)?;

        let response = self
            .post_unauthenticated(REGISTER_PATH, &request.to_body())
            .await?;
        let user = self.establish(response)?;
        info!(user_id = user.id, role = %user.role, "Registration successful");
        Ok(user)
    }

    /// Forget the session locally. The server keeps no session to revoke.
    pub fn logout(&self) {
        self.store.clear(ClearReason::Logout);
    }

    /// Current user as the server sees it.
    pub async fn profile(&self) -> Result<User, ApiError> {
        self.gateway.get(PROFILE_PATH).await
    }

    fn establish(&self, response: HttpResponse) -> Result<User, ApiError> {
        let pair: TokenPair = serde_json::from_str(&response.body)
            .map_err(|e| ApiError::InvalidResponse(format!("failed to parse auth response: {}", e)))?;
        let user = pair.user.clone();

        self.store
            .set(Session::new(pair.access, pair.refresh, pair.user))
            .map_err(|e| ApiError::Storage(e.to_string()))?;
        Ok(user)
    }

    async fn post_unauthenticated<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<HttpResponse, ApiError> {
        let url = join_url(&self.base_url, path);
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("failed to encode request body: {}", e)))?;
        let request = HttpRequest {
            method: Method::POST,
            url: url.clone(),
            bearer: None,
            body: Some(body),
        };

        let response = match tokio::time::timeout(self.timeout, self.transport.execute(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(url = %url, kind = "network", "Auth request failed");
                return Err(ApiError::Network(e.0));
            }
            Err(_) => {
                warn!(url = %url, kind = "network", "Auth request timed out");
                return Err(ApiError::Network(format!(
                    "request timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if response.is_success() {
            return Ok(response);
        }

        let error = match response.status {
            401 => ApiError::InvalidCredentials,
            status => ApiError::from_status(status, &response.body),
        };
        warn!(url = %url, kind = error.kind(), "Auth request failed");
        Err(error)
    }
}
