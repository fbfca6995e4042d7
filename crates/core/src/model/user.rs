use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::ids::UserId;

/// Cached profile of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub user_type: String,
    #[serde(default)]
    pub is_premium: bool,
}

impl UserProfile {
    /// Full name when present, otherwise the username.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.full_name.trim().is_empty() {
            &self.username
        } else {
            &self.full_name
        }
    }
}

/// Access/refresh token pair.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthTokens {
    pub access: String,
    pub refresh: String,
}

impl AuthTokens {
    #[must_use]
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }
}

// Tokens must not leak into logs.
impl fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// Everything persisted about the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub tokens: AuthTokens,
    pub user: Option<UserProfile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_redacted_in_debug() {
        let tokens = AuthTokens::new("secret-access", "secret-refresh");
        let out = format!("{tokens:?}");
        assert!(!out.contains("secret"));
    }

    #[test]
    fn profile_tolerates_missing_optional_fields() {
        let profile: UserProfile =
            serde_json::from_str(r#"{"id": 3, "username": "ana"}"#).unwrap();
        assert_eq!(profile.id, UserId::new(3));
        assert_eq!(profile.display_name(), "ana");
    }
}
