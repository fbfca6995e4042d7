use async_trait::async_trait;
use prep_core::model::{AuthState, AuthTokens, UserProfile};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Keys of the on-device secure store.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const USER: &str = "user";

    /// Written by older builds; read as a fallback and removed on the next save.
    pub const LEGACY_ACCESS_TOKEN: &str = "token";
    pub const LEGACY_REFRESH_TOKEN: &str = "refreshToken";

    pub const ALL: [&str; 5] = [
        ACCESS_TOKEN,
        REFRESH_TOKEN,
        USER,
        LEGACY_ACCESS_TOKEN,
        LEGACY_REFRESH_TOKEN,
    ];
}

/// Rebuild auth state from raw store entries.
///
/// Canonical keys win over legacy ones. Both tokens must be present for a
/// session to count as signed in; a cached profile alone is ignored.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the cached profile is not valid JSON.
pub fn auth_from_entries(
    entries: &HashMap<String, String>,
) -> Result<Option<AuthState>, StorageError> {
    let pick = |key: &str, legacy: &str| {
        entries
            .get(key)
            .or_else(|| entries.get(legacy))
            .filter(|v| !v.is_empty())
            .cloned()
    };

    let access = pick(keys::ACCESS_TOKEN, keys::LEGACY_ACCESS_TOKEN);
    let refresh = pick(keys::REFRESH_TOKEN, keys::LEGACY_REFRESH_TOKEN);
    let (Some(access), Some(refresh)) = (access, refresh) else {
        return Ok(None);
    };

    let user = entries
        .get(keys::USER)
        .map(|raw| serde_json::from_str::<UserProfile>(raw))
        .transpose()
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    Ok(Some(AuthState {
        tokens: AuthTokens::new(access, refresh),
        user,
    }))
}

/// Entries to write for `state`, canonical keys only.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the profile cannot be encoded.
pub fn entries_from_auth(state: &AuthState) -> Result<Vec<(&'static str, String)>, StorageError> {
    let mut out = vec![
        (keys::ACCESS_TOKEN, state.tokens.access.clone()),
        (keys::REFRESH_TOKEN, state.tokens.refresh.clone()),
    ];
    if let Some(user) = &state.user {
        let raw =
            serde_json::to_string(user).map_err(|e| StorageError::Serialization(e.to_string()))?;
        out.push((keys::USER, raw));
    }
    Ok(out)
}

/// Durable storage for tokens and the cached user profile.
#[async_trait]
pub trait AuthStateRepository: Send + Sync {
    /// Read persisted auth state, if a signed-in session exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or decode failures.
    async fn load_auth(&self) -> Result<Option<AuthState>, StorageError>;

    /// Replace the persisted auth state, dropping legacy keys.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the state cannot be stored.
    async fn save_auth(&self, state: &AuthState) -> Result<(), StorageError>;

    /// Store a refreshed access token, keeping the refresh token and profile.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the token cannot be stored.
    async fn save_access_token(&self, access: &str) -> Result<(), StorageError>;

    /// Update the cached profile.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the profile cannot be stored.
    async fn save_user(&self, user: &UserProfile) -> Result<(), StorageError>;

    /// Remove every auth key, legacy ones included.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be cleared.
    async fn clear_auth(&self) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw entry, e.g. to simulate data written by an older build.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn insert_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock()?.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    /// Read a raw entry.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StorageError> {
        self.entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl AuthStateRepository for InMemoryRepository {
    async fn load_auth(&self) -> Result<Option<AuthState>, StorageError> {
        let guard = self.lock()?;
        auth_from_entries(&guard)
    }

    async fn save_auth(&self, state: &AuthState) -> Result<(), StorageError> {
        let entries = entries_from_auth(state)?;
        let mut guard = self.lock()?;
        for key in keys::ALL {
            guard.remove(key);
        }
        for (key, value) in entries {
            guard.insert(key.to_owned(), value);
        }
        Ok(())
    }

    async fn save_access_token(&self, access: &str) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.remove(keys::LEGACY_ACCESS_TOKEN);
        guard.insert(keys::ACCESS_TOKEN.to_owned(), access.to_owned());
        Ok(())
    }

    async fn save_user(&self, user: &UserProfile) -> Result<(), StorageError> {
        let raw =
            serde_json::to_string(user).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.lock()?.insert(keys::USER.to_owned(), raw);
        Ok(())
    }

    async fn clear_auth(&self) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        for key in keys::ALL {
            guard.remove(key);
        }
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub auth: Arc<dyn AuthStateRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let auth: Arc<dyn AuthStateRepository> = Arc::new(InMemoryRepository::new());
        Self { auth }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prep_core::model::UserId;

    fn profile() -> UserProfile {
        UserProfile {
            id: UserId::new(1),
            username: "ana".into(),
            email: "ana@example.com".into(),
            first_name: "Ana".into(),
            last_name: "Lima".into(),
            full_name: "Ana Lima".into(),
            user_type: "student".into(),
            is_premium: false,
        }
    }

    #[tokio::test]
    async fn round_trips_auth_state() {
        let repo = InMemoryRepository::new();
        let state = AuthState {
            tokens: AuthTokens::new("a1", "r1"),
            user: Some(profile()),
        };
        repo.save_auth(&state).await.unwrap();

        let loaded = repo.load_auth().await.unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn legacy_keys_are_read_and_replaced_on_save() {
        let repo = InMemoryRepository::new();
        repo.insert_raw(keys::LEGACY_ACCESS_TOKEN, "old-a").unwrap();
        repo.insert_raw(keys::LEGACY_REFRESH_TOKEN, "old-r").unwrap();

        let loaded = repo.load_auth().await.unwrap().unwrap();
        assert_eq!(loaded.tokens, AuthTokens::new("old-a", "old-r"));
        assert!(loaded.user.is_none());

        repo.save_auth(&loaded).await.unwrap();
        assert_eq!(repo.get_raw(keys::LEGACY_ACCESS_TOKEN).unwrap(), None);
        assert_eq!(
            repo.get_raw(keys::ACCESS_TOKEN).unwrap().as_deref(),
            Some("old-a")
        );
    }

    #[tokio::test]
    async fn canonical_keys_win_over_legacy() {
        let repo = InMemoryRepository::new();
        repo.insert_raw(keys::LEGACY_ACCESS_TOKEN, "old").unwrap();
        repo.insert_raw(keys::ACCESS_TOKEN, "new").unwrap();
        repo.insert_raw(keys::REFRESH_TOKEN, "r").unwrap();

        let loaded = repo.load_auth().await.unwrap().unwrap();
        assert_eq!(loaded.tokens.access, "new");
    }

    #[tokio::test]
    async fn profile_without_tokens_is_not_signed_in() {
        let repo = InMemoryRepository::new();
        repo.save_user(&profile()).await.unwrap();
        assert!(repo.load_auth().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let repo = InMemoryRepository::new();
        repo.save_auth(&AuthState {
            tokens: AuthTokens::new("a", "r"),
            user: Some(profile()),
        })
        .await
        .unwrap();
        repo.insert_raw(keys::LEGACY_REFRESH_TOKEN, "x").unwrap();

        repo.clear_auth().await.unwrap();
        assert!(repo.load_auth().await.unwrap().is_none());
        for key in keys::ALL {
            assert_eq!(repo.get_raw(key).unwrap(), None);
        }
    }

    #[tokio::test]
    async fn access_token_update_keeps_refresh_and_user() {
        let repo = InMemoryRepository::new();
        repo.save_auth(&AuthState {
            tokens: AuthTokens::new("a", "r"),
            user: Some(profile()),
        })
        .await
        .unwrap();

        repo.save_access_token("a2").await.unwrap();
        let loaded = repo.load_auth().await.unwrap().unwrap();
        assert_eq!(loaded.tokens, AuthTokens::new("a2", "r"));
        assert_eq!(loaded.user, Some(profile()));
    }

    #[tokio::test]
    async fn corrupt_cached_profile_is_a_serialization_error() {
        let repo = InMemoryRepository::new();
        repo.insert_raw(keys::ACCESS_TOKEN, "a").unwrap();
        repo.insert_raw(keys::REFRESH_TOKEN, "r").unwrap();
        repo.insert_raw(keys::USER, "{not json").unwrap();

        let err = repo.load_auth().await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
        assert!(err.to_string().starts_with("serialization error"));
    }
}
