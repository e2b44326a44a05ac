use std::fmt;

use crate::models::{Role, User};

/// Storage key of the access token.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// Storage key of the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
/// Storage key of the JSON-serialized user profile.
pub const USER_KEY: &str = "user";

pub const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY];

/// An authenticated client: both tokens and the user they belong to.
///
/// Holding a `Session` means the access token and user are both present; a
/// half-populated session cannot be represented.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: User,
}

impl Session {
    pub fn new(access_token: String, refresh_token: String, user: User) -> Self {
        Self {
            access_token,
            refresh_token: Some(refresh_token),
            user,
        }
    }

    pub fn role(&self) -> Role {
        self.user.role
    }
}

// Tokens never reach logs through Debug.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("user_id", &self.user.id)
            .field("role", &self.user.role)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixture_user;

    #[test]
    fn test_debug_redacts_tokens() {
        let session = Session::new("secret-access".into(), "secret-refresh".into(), fixture_user(Role::Admin));
        let printed = format!("{:?}", session);
        assert!(!printed.contains("secret-access"));
        assert!(!printed.contains("secret-refresh"));
        assert!(printed.contains("Admin"));
    }
}
