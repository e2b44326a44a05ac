//! Paths and wire types of the authentication service.

use serde::{Deserialize, Serialize};

use crate::models::User;

pub const LOGIN_PATH: &str = "/auth/login/";
pub const REGISTER_PATH: &str = "/auth/register/";
pub const TOKEN_REFRESH_PATH: &str = "/auth/token/refresh/";
pub const PROFILE_PATH: &str = "/auth/profile/";

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Body returned by both login and registration.
#[derive(Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
    pub user: User,
}

#[derive(Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

#[derive(Deserialize)]
pub struct RefreshResponse {
    pub access: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn test_parse_token_pair() {
        let json = r#"{"access": "a1", "refresh": "r1", "user": {"id": 3, "username": "sari", "email": "sari@example.com", "role": "siswa"}}"#;
        let pair: TokenPair = serde_json::from_str(json).unwrap();
        assert_eq!(pair.access, "a1");
        assert_eq!(pair.refresh, "r1");
        assert_eq!(pair.user.role, Role::Siswa);
    }

    #[test]
    fn test_refresh_response_without_access() {
        let resp: RefreshResponse = serde_json::from_str(r#"{"detail": "ok"}"#).unwrap();
        assert!(resp.access.is_none());
    }
}
