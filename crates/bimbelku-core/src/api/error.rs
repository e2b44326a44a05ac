use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

const NETWORK_MESSAGE: &str = "Tidak dapat terhubung ke server";
const SESSION_EXPIRED_MESSAGE: &str = "Sesi Anda telah berakhir. Silakan login kembali.";
const INVALID_CREDENTIALS_MESSAGE: &str = "Email atau password salah";
const GENERIC_SERVER_MESSAGE: &str = "Terjadi kesalahan pada server";

/// Outcome of a call through the gateway or the auth service.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Validation failed: {}", .0.summary())]
    Validation(FieldErrors),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Session expired")]
    SessionExpired,

    #[error("Token renewal failed: {0}")]
    RenewalFailed(#[from] RenewalError),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Session storage error: {0}")]
    Storage(String),
}

/// Why a refresh-token exchange did not produce a new access token.
///
/// Cloned to every caller waiting on the same in-flight renewal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenewalError {
    #[error("no refresh token stored")]
    MissingRefreshToken,

    #[error("network error: {0}")]
    Network(String),

    #[error("refresh rejected with status {status}")]
    Rejected { status: u16 },

    #[error("malformed refresh response: {0}")]
    Malformed(String),

    #[error("session was cleared while renewing")]
    SessionCleared,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Best-effort human message from an error body: `error`, then `detail`,
    /// then the raw (truncated) text.
    pub fn extract_message(body: &str) -> String {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
            for key in ["error", "detail", "message"] {
                if let Some(Value::String(message)) = map.get(key) {
                    return message.clone();
                }
            }
        }
        Self::truncate_body(body.trim())
    }

    /// Map a non-2xx status to its error class. 401 is not handled here:
    /// whether it means "renew" or "expired" depends on the attempt.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            400 => ApiError::Validation(FieldErrors::from_body(body)),
            403 => ApiError::Forbidden(Self::extract_message(body)),
            404 => ApiError::NotFound(Self::extract_message(body)),
            _ => ApiError::Server {
                status,
                message: Self::extract_message(body),
            },
        }
    }

    /// Short class name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Network(_) => "network",
            ApiError::Validation(_) => "validation",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::SessionExpired => "session_expired",
            ApiError::RenewalFailed(_) => "renewal_failed",
            ApiError::InvalidCredentials => "invalid_credentials",
            ApiError::Server { .. } => "server",
            ApiError::InvalidResponse(_) => "invalid_response",
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::Storage(_) => "storage",
        }
    }

    /// True when the session is gone and the user has to log in again.
    pub fn requires_login(&self) -> bool {
        matches!(self, ApiError::SessionExpired | ApiError::RenewalFailed(_))
    }

    /// Field-level messages, when the server (or the form) rejected input.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            ApiError::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    /// Single message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Network(_) => NETWORK_MESSAGE.to_string(),
            ApiError::SessionExpired | ApiError::RenewalFailed(_) => {
                SESSION_EXPIRED_MESSAGE.to_string()
            }
            ApiError::Validation(errors) => errors.summary(),
            ApiError::InvalidCredentials => INVALID_CREDENTIALS_MESSAGE.to_string(),
            ApiError::Forbidden(_) => "Anda tidak memiliki akses ke halaman ini".to_string(),
            ApiError::NotFound(_) => "Data yang diminta tidak ditemukan".to_string(),
            ApiError::Server { message, .. } if !message.is_empty() => message.clone(),
            ApiError::Server { .. } | ApiError::InvalidResponse(_) => {
                GENERIC_SERVER_MESSAGE.to_string()
            }
            ApiError::InvalidRequest(message) => message.clone(),
            ApiError::Storage(_) => "Sesi tidak dapat disimpan di perangkat ini".to_string(),
        }
    }
}

/// Field name → messages, as returned by the server on 400 or produced by
/// client-side form checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Parse a 400 body. Values may be a string, a list of strings, or
    /// anything else (kept as its JSON text). A non-JSON body lands under `detail`.
    pub fn from_body(body: &str) -> Self {
        let mut errors = Self::new();
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => {
                for (field, value) in map {
                    match value {
                        Value::String(message) => errors.add(&field, message),
                        Value::Array(items) => {
                            for item in items {
                                match item {
                                    Value::String(message) => errors.add(&field, message),
                                    other => errors.add(&field, other.to_string()),
                                }
                            }
                        }
                        other => errors.add(&field, other.to_string()),
                    }
                }
            }
            _ => {
                let text = body.trim();
                if !text.is_empty() {
                    errors.add("detail", ApiError::truncate_body(text));
                }
            }
        }
        errors
    }

    /// All messages joined into one line; `detail` alone when present.
    pub fn summary(&self) -> String {
        if let Some(detail) = self.0.get("detail").and_then(|d| d.first()) {
            return detail.clone();
        }
        let joined = self
            .0
            .values()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        if joined.is_empty() {
            "Terjadi kesalahan".to_string()
        } else {
            joined
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classes() {
        assert!(matches!(ApiError::from_status(400, "{}"), ApiError::Validation(_)));
        assert!(matches!(ApiError::from_status(403, ""), ApiError::Forbidden(_)));
        assert!(matches!(ApiError::from_status(404, ""), ApiError::NotFound(_)));
        assert!(matches!(
            ApiError::from_status(502, "bad gateway"),
            ApiError::Server { status: 502, .. }
        ));
        assert!(matches!(
            ApiError::from_status(409, r#"{"error": "duplicate"}"#),
            ApiError::Server { status: 409, ref message } if message == "duplicate"
        ));
    }

    #[test]
    fn test_extract_message_prefers_error_then_detail() {
        assert_eq!(ApiError::extract_message(r#"{"error": "e", "detail": "d"}"#), "e");
        assert_eq!(ApiError::extract_message(r#"{"detail": "d"}"#), "d");
        assert_eq!(ApiError::extract_message("plain text"), "plain text");
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.contains("truncated"));
    }

    #[test]
    fn test_field_errors_from_django_body() {
        let body = r#"{"email": ["user with this email already exists."], "password": "This password is too common.", "code": 12}"#;
        let errors = FieldErrors::from_body(body);
        assert_eq!(errors.get("email"), ["user with this email already exists.".to_string()]);
        assert_eq!(errors.get("password"), ["This password is too common.".to_string()]);
        assert_eq!(errors.get("code"), ["12".to_string()]);
        assert!(errors.get("username").is_empty());
        assert_eq!(
            errors.summary(),
            "12, user with this email already exists., This password is too common."
        );
    }

    #[test]
    fn test_field_errors_detail_wins_summary() {
        let errors = FieldErrors::from_body(r#"{"detail": "Bad request", "x": ["y"]}"#);
        assert_eq!(errors.summary(), "Bad request");

        let errors = FieldErrors::from_body("not json");
        assert_eq!(errors.get("detail"), ["not json".to_string()]);
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(ApiError::Network("timeout".into()).user_message(), NETWORK_MESSAGE);
        assert_eq!(ApiError::SessionExpired.user_message(), SESSION_EXPIRED_MESSAGE);
        assert_eq!(
            ApiError::RenewalFailed(RenewalError::MissingRefreshToken).user_message(),
            SESSION_EXPIRED_MESSAGE
        );
        assert_ne!(
            ApiError::Network("x".into()).user_message(),
            ApiError::SessionExpired.user_message()
        );
    }

    #[test]
    fn test_user_messages_are_indonesian() {
        assert_eq!(ApiError::InvalidCredentials.user_message(), "Email atau password salah");
        assert_eq!(ApiError::Network("x".into()).user_message(), "Tidak dapat terhubung ke server");
        assert_eq!(
            ApiError::from_status(500, "").user_message(),
            "Terjadi kesalahan pada server"
        );
        assert_eq!(FieldErrors::new().summary(), "Terjadi kesalahan");
    }

    #[test]
    fn test_requires_login() {
        assert!(ApiError::SessionExpired.requires_login());
        assert!(ApiError::RenewalFailed(RenewalError::Rejected { status: 401 }).requires_login());
        assert!(!ApiError::Network("x".into()).requires_login());
        assert!(!ApiError::Forbidden("x".into()).requires_login());
    }
}
