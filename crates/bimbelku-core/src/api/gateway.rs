//! The single chokepoint for authenticated API calls.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::transport::{join_url, HttpRequest, HttpResponse, HttpTransport};
use super::ApiError;
use crate::auth::{ClearReason, CredentialStore, RenewalCoordinator};

/// Where a call is in the renew-and-replay protocol. A call moves from
/// `FirstAttempt` to `RetryAfterRenewal` at most once and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    FirstAttempt,
    RetryAfterRenewal,
}

/// One logical API call. Replays reuse the same method, URL and body.
#[derive(Debug, Clone)]
pub struct ApiCall {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
    pub attempt: Attempt,
}

impl ApiCall {
    pub fn new(method: Method, url: String, body: Option<Value>) -> Self {
        Self {
            method,
            url,
            body,
            attempt: Attempt::FirstAttempt,
        }
    }

    fn into_retry(self) -> Self {
        Self {
            attempt: Attempt::RetryAfterRenewal,
            ..self
        }
    }

    fn to_request(&self, bearer: Option<String>) -> HttpRequest {
        HttpRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            bearer,
            body: self.body.clone(),
        }
    }
}

/// Successful (2xx) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    /// Decode the body as JSON. An empty body decodes as `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let text = if self.body.trim().is_empty() { "null" } else { &self.body };
        serde_json::from_str(text)
            .map_err(|e| ApiError::InvalidResponse(format!("failed to parse JSON body: {}", e)))
    }
}

impl From<HttpResponse> for ApiResponse {
    fn from(response: HttpResponse) -> Self {
        Self {
            status: response.status,
            body: response.body,
        }
    }
}

/// Attaches the access token to every call and recovers from one expiry
/// per call by renewing and replaying.
///
/// Clone is cheap; clones share the transport, store and renewal state.
#[derive(Clone)]
pub struct RequestGateway {
    transport: Arc<dyn HttpTransport>,
    store: CredentialStore,
    renewal: RenewalCoordinator,
    base_url: String,
    timeout: Duration,
}

impl RequestGateway {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        store: CredentialStore,
        renewal: RenewalCoordinator,
        base_url: String,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            renewal,
            base_url,
            timeout,
        }
    }

    /// Issue a call. `path` is relative to the configured API URL unless it
    /// is already absolute.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<ApiResponse, ApiError> {
        let call = ApiCall::new(method, join_url(&self.base_url, path), body);
        let method = call.method.clone();
        let url = call.url.clone();

        let result = self.run(call).await;
        if let Err(ref e) = result {
            warn!(method = %method, url = %url, kind = e.kind(), "API call failed");
        }
        result
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(Method::GET, path, None).await?.json()
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = Self::encode(body)?;
        self.send(Method::POST, path, Some(body)).await?.json()
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = Self::encode(body)?;
        self.send(Method::PUT, path, Some(body)).await?.json()
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.send(Method::DELETE, path, None).await
    }

    fn encode<B: Serialize>(body: &B) -> Result<Value, ApiError> {
        serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("failed to encode request body: {}", e)))
    }

    async fn run(&self, call: ApiCall) -> Result<ApiResponse, ApiError> {
        let mut call = call;
        let (session, session_id) = self.store.snapshot();
        let mut token = session.map(|s| s.access_token);

        loop {
            let response = self.dispatch(&call, token.clone()).await?;
            if response.status != 401 {
                return Self::classify(response);
            }

            match call.attempt {
                Attempt::FirstAttempt => {
                    debug!(method = %call.method, url = %call.url, "Received 401, renewing access token");
                    let fresh = self.renewal.renew(token.as_deref(), session_id).await?;
                    token = Some(fresh);
                    call = call.into_retry();
                }
                Attempt::RetryAfterRenewal => {
                    self.store.clear_if(session_id, ClearReason::SessionExpired);
                    return Err(ApiError::SessionExpired);
                }
            }
        }
    }

    async fn dispatch(&self, call: &ApiCall, token: Option<String>) -> Result<HttpResponse, ApiError> {
        debug!(
            method = %call.method,
            url = %call.url,
            attempt = ?call.attempt,
            authenticated = token.is_some(),
            "Dispatching request"
        );

        let request = call.to_request(token);
        match tokio::time::timeout(self.timeout, self.transport.execute(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(ApiError::Network(e.0)),
            Err(_) => Err(ApiError::Network(format!(
                "request timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    fn classify(response: HttpResponse) -> Result<ApiResponse, ApiError> {
        if response.is_success() {
            Ok(response.into())
        } else {
            Err(ApiError::from_status(response.status, &response.body))
        }
    }
}
