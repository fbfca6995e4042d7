use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use prep_core::model::{AuthState, UserProfile};
use storage::repository::{AuthStateRepository, StorageError};

/// Signed-in state shared by every API call.
///
/// Memory is the source of truth while running; each mutation is written
/// through to the repository so the next launch can restore it.
pub struct AuthSession {
    repo: Arc<dyn AuthStateRepository>,
    state: RwLock<Option<AuthState>>,
}

impl AuthSession {
    /// A signed-out session.
    #[must_use]
    pub fn new(repo: Arc<dyn AuthStateRepository>) -> Self {
        Self {
            repo,
            state: RwLock::new(None),
        }
    }

    /// Load whatever the repository holds from a previous run.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the persisted state cannot be read.
    pub async fn restore(repo: Arc<dyn AuthStateRepository>) -> Result<Self, StorageError> {
        let state = repo.load_auth().await?;
        if state.is_some() {
            tracing::debug!("restored persisted sign-in");
        }
        Ok(Self {
            repo,
            state: RwLock::new(state),
        })
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.read().as_ref().map(|s| s.tokens.access.clone())
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.read().as_ref().map(|s| s.tokens.refresh.clone())
    }

    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.read().as_ref().and_then(|s| s.user.clone())
    }

    /// Replace the signed-in state after login or registration.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the state cannot be persisted; memory is
    /// updated regardless so the running client stays signed in.
    pub async fn establish(&self, state: AuthState) -> Result<(), StorageError> {
        *self.write() = Some(state.clone());
        self.repo.save_auth(&state).await
    }

    /// Store a refreshed access token, and the rotated refresh token if the
    /// backend issued one. No-op when signed out.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the tokens cannot be persisted.
    pub async fn update_tokens(
        &self,
        access: String,
        refresh: Option<String>,
    ) -> Result<(), StorageError> {
        let snapshot = {
            let mut guard = self.write();
            let Some(state) = guard.as_mut() else {
                return Ok(());
            };
            state.tokens.access.clone_from(&access);
            if let Some(refresh) = refresh.as_ref() {
                state.tokens.refresh.clone_from(refresh);
            }
            refresh.is_some().then(|| state.clone())
        };

        match snapshot {
            Some(state) => self.repo.save_auth(&state).await,
            None => self.repo.save_access_token(&access).await,
        }
    }

    /// Update the cached profile. No-op when signed out.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the profile cannot be persisted.
    pub async fn update_user(&self, user: UserProfile) -> Result<(), StorageError> {
        {
            let mut guard = self.write();
            let Some(state) = guard.as_mut() else {
                return Ok(());
            };
            state.user = Some(user.clone());
        }
        self.repo.save_user(&user).await
    }

    /// Forget the signed-in user, in memory first and then on disk.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if persisted keys cannot be removed; the
    /// in-memory state is cleared either way.
    pub async fn teardown(&self) -> Result<(), StorageError> {
        self.write().take();
        self.repo.clear_auth().await
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<AuthState>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<AuthState>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}
