use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use prep_core::model::{AuthState, AuthTokens, UserProfile};

use crate::api::ApiClient;
use crate::api::dto::{
    AuthResponse, ChangePasswordRequest, LoginRequest, ProfileResponse, ProfileUpdate,
    Registration,
};
use crate::error::{ApiError, AuthError};

#[derive(Serialize)]
struct LogoutRequest<'a> {
    refresh: &'a str,
}

/// Account operations: sign-in lifecycle and profile management.
#[derive(Clone)]
pub struct AuthService {
    api: Arc<ApiClient>,
}

impl AuthService {
    #[must_use]
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.api.auth().is_authenticated()
    }

    /// Profile cached at the last sign-in or refresh.
    #[must_use]
    pub fn cached_user(&self) -> Option<UserProfile> {
        self.api.auth().user()
    }

    /// Create an account and sign in with it.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingField` or `AuthError::PasswordMismatch`
    /// before any request is made, `AuthError::Api` if the backend rejects the
    /// registration, and `AuthError::Storage` if the sign-in cannot be saved.
    pub async fn register(&self, registration: &Registration) -> Result<UserProfile, AuthError> {
        for (field, value) in [
            ("username", &registration.username),
            ("email", &registration.email),
            ("password", &registration.password),
        ] {
            if value.trim().is_empty() {
                return Err(AuthError::MissingField(field));
            }
        }
        if registration.password != registration.password_confirm {
            return Err(AuthError::PasswordMismatch);
        }

        let response: AuthResponse = self
            .api
            .post_public("auth/register/", registration)
            .await?;
        self.sign_in(response).await
    }

    /// Sign in with username and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Api` for rejected credentials or transport failures
    /// and `AuthError::Storage` if the sign-in cannot be saved.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile, AuthError> {
        if username.trim().is_empty() {
            return Err(AuthError::MissingField("username"));
        }
        if password.is_empty() {
            return Err(AuthError::MissingField("password"));
        }

        let response: AuthResponse = self
            .api
            .post_public(
                "auth/login/",
                &LoginRequest {
                    username: username.trim(),
                    password,
                },
            )
            .await?;
        self.sign_in(response).await
    }

    /// Sign out. The backend is told to blacklist the refresh token on a
    /// best-effort basis; local state is cleared regardless.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Storage` if the stored sign-in cannot be removed.
    pub async fn logout(&self) -> Result<(), AuthError> {
        if let Some(refresh) = self.api.auth().refresh_token() {
            let result: Result<Value, ApiError> = self
                .api
                .post("auth/logout/", &LogoutRequest { refresh: &refresh })
                .await;
            if let Err(err) = result {
                tracing::warn!(error = %err, "server logout failed; clearing local sign-in anyway");
            }
        }
        self.api.auth().teardown().await?;
        tracing::info!("signed out");
        Ok(())
    }

    /// Fetch the profile from the backend and refresh the cache.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` for request or storage failures.
    pub async fn current_user(&self) -> Result<UserProfile, AuthError> {
        let user: ProfileResponse = self.api.get("users/me/").await?;
        let user = user.into_user();
        self.api.auth().update_user(user.clone()).await?;
        Ok(user)
    }

    /// Apply a partial profile update.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingField` for an empty update and `AuthError`
    /// for request or storage failures.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, AuthError> {
        if update.is_empty() {
            return Err(AuthError::MissingField("profile field"));
        }
        let user: ProfileResponse = self.api.patch("users/update_profile/", update).await?;
        let user = user.into_user();
        self.api.auth().update_user(user.clone()).await?;
        Ok(user)
    }

    /// Change the account password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::PasswordMismatch` when the confirmation differs and
    /// `AuthError::Api` if the backend rejects the change.
    pub async fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
        new_password_confirm: &str,
    ) -> Result<(), AuthError> {
        if new_password.is_empty() {
            return Err(AuthError::MissingField("new password"));
        }
        if new_password != new_password_confirm {
            return Err(AuthError::PasswordMismatch);
        }
        let _: Value = self
            .api
            .post(
                "users/change_password/",
                &ChangePasswordRequest {
                    old_password,
                    new_password,
                    new_password_confirm,
                },
            )
            .await?;
        Ok(())
    }

    async fn sign_in(&self, response: AuthResponse) -> Result<UserProfile, AuthError> {
        let AuthResponse { user, tokens } = response;
        self.api
            .auth()
            .establish(AuthState {
                tokens: AuthTokens::new(tokens.access, tokens.refresh),
                user: Some(user.clone()),
            })
            .await?;
        tracing::info!(user = %user.username, "signed in");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthSession;
    use crate::config::ClientConfig;
    use storage::repository::InMemoryRepository;

    fn service() -> AuthService {
        let auth = Arc::new(AuthSession::new(Arc::new(InMemoryRepository::new())));
        // Nothing listens here; every test below fails before sending.
        let config = ClientConfig::new("http://127.0.0.1:9").unwrap();
        AuthService::new(Arc::new(ApiClient::new(config, auth).unwrap()))
    }

    #[tokio::test]
    async fn register_checks_password_confirmation_locally() {
        let registration = Registration {
            username: "lee".into(),
            email: "lee@example.com".into(),
            password: "hunter22".into(),
            password_confirm: "hunter23".into(),
            ..Registration::default()
        };
        assert!(matches!(
            service().register(&registration).await,
            Err(AuthError::PasswordMismatch)
        ));
    }

    #[tokio::test]
    async fn register_requires_core_fields() {
        let registration = Registration {
            username: "lee".into(),
            ..Registration::default()
        };
        assert!(matches!(
            service().register(&registration).await,
            Err(AuthError::MissingField("email"))
        ));
    }

    #[tokio::test]
    async fn login_requires_credentials() {
        assert!(matches!(
            service().login("  ", "pw").await,
            Err(AuthError::MissingField("username"))
        ));
    }

    #[tokio::test]
    async fn signed_out_calls_fail_without_network() {
        let svc = service();
        assert!(matches!(
            svc.current_user().await,
            Err(AuthError::Api(ApiError::Unauthorized))
        ));
        assert!(matches!(
            svc.change_password("old", "new", "other").await,
            Err(AuthError::PasswordMismatch)
        ));
        svc.logout().await.unwrap();
        assert!(!svc.is_authenticated());
    }
}
