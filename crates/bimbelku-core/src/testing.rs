//! Test doubles shared by the unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use crate::api::endpoints::TOKEN_REFRESH_PATH;
use crate::api::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use crate::auth::{MemoryPersistence, Session};
use crate::models::{Role, User};
use crate::{BimbelClient, Config};

pub(crate) const TEST_API_URL: &str = "http://bimbel.test";

pub(crate) enum Reply {
    Respond(u16, String),
    Fail(String),
    Hang,
}

impl Reply {
    pub(crate) fn json(status: u16, body: Value) -> Self {
        Reply::Respond(status, body.to_string())
    }

    pub(crate) fn text(status: u16, body: &str) -> Self {
        Reply::Respond(status, body.to_string())
    }

    pub(crate) fn fail(message: &str) -> Self {
        Reply::Fail(message.to_string())
    }
}

type Handler = dyn Fn(&HttpRequest) -> Reply + Send + Sync;

/// Scripted transport: answers every request through `handler` and records it.
pub(crate) struct MockTransport {
    handler: Box<Handler>,
    requests: Mutex<Vec<HttpRequest>>,
    refresh_delay: Mutex<Duration>,
}

impl MockTransport {
    pub(crate) fn new(handler: impl Fn(&HttpRequest) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            refresh_delay: Mutex::new(Duration::ZERO),
        })
    }

    /// Make the refresh endpoint slow so concurrent callers overlap.
    pub(crate) fn with_refresh_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.refresh_delay.lock().unwrap() = delay;
        self
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests whose URL ends with `path`.
    pub(crate) fn count(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.ends_with(path))
            .count()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        let delay = *self.refresh_delay.lock().unwrap();
        if !delay.is_zero() && request.url.ends_with(TOKEN_REFRESH_PATH) {
            tokio::time::sleep(delay).await;
        }

        match (self.handler)(&request) {
            Reply::Respond(status, body) => Ok(HttpResponse { status, body }),
            Reply::Fail(message) => Err(TransportError(message)),
            Reply::Hang => std::future::pending().await,
        }
    }
}

pub(crate) fn fixture_user(role: Role) -> User {
    match role {
        Role::Admin => User {
            id: 1,
            username: "admin".to_string(),
            email: "admin@bimbelku.test".to_string(),
            role,
            phone: None,
            birth_date: None,
            address: None,
        },
        Role::Siswa => User {
            id: 7,
            username: "budi".to_string(),
            email: "budi@bimbelku.test".to_string(),
            role,
            phone: Some("08123456789".to_string()),
            birth_date: NaiveDate::from_ymd_opt(2008, 5, 17),
            address: Some("Jl. Merdeka 10".to_string()),
        },
    }
}

pub(crate) fn fixture_session(access: &str, refresh: &str, role: Role) -> Session {
    Session::new(access.to_string(), refresh.to_string(), fixture_user(role))
}

pub(crate) fn test_config() -> Config {
    Config {
        api_url: TEST_API_URL.to_string(),
        ..Config::default()
    }
}

pub(crate) fn test_client(transport: Arc<MockTransport>, session: Option<Session>) -> BimbelClient {
    test_client_with(transport, MemoryPersistence::new(), session)
}

pub(crate) fn test_client_with(
    transport: Arc<MockTransport>,
    persistence: MemoryPersistence,
    session: Option<Session>,
) -> BimbelClient {
    let client =
        BimbelClient::with_transport(test_config(), Box::new(persistence), transport).unwrap();
    if let Some(session) = session {
        client.store.set(session).unwrap();
    }
    client
}
