use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::api::ApiClient;
use crate::auth::AuthSession;
use crate::auth_service::AuthService;
use crate::catalog::CatalogService;
use crate::config::ClientConfig;
use crate::error::AppServicesError;
use crate::insights::InsightsService;
use crate::session::{SessionLauncher, SessionOptions};

/// Assembles app-facing services around one auth session and API client.
#[derive(Clone)]
pub struct AppServices {
    api: Arc<ApiClient>,
    auth: Arc<AuthService>,
    catalog: Arc<CatalogService>,
    insights: Arc<InsightsService>,
    sessions: Arc<SessionLauncher>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage, restoring any persisted
    /// sign-in.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization, sign-in restore,
    /// or HTTP client setup fails.
    pub async fn new_sqlite(config: ClientConfig, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(&config.db_url).await?;
        Self::with_storage(storage, config, clock).await
    }

    /// Build services over any storage backend.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if sign-in restore or HTTP client setup fails.
    pub async fn with_storage(
        storage: Storage,
        config: ClientConfig,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let auth_session = Arc::new(AuthSession::restore(Arc::clone(&storage.auth)).await?);
        let options = SessionOptions {
            autosave: config.autosave,
            clock,
            ..SessionOptions::default()
        };
        let api = Arc::new(ApiClient::new(config, auth_session)?);

        Ok(Self {
            auth: Arc::new(AuthService::new(Arc::clone(&api))),
            catalog: Arc::new(CatalogService::new(Arc::clone(&api))),
            insights: Arc::new(InsightsService::new(Arc::clone(&api))),
            sessions: Arc::new(SessionLauncher::new(Arc::clone(&api), options)),
            api,
        })
    }

    #[must_use]
    pub fn api(&self) -> Arc<ApiClient> {
        Arc::clone(&self.api)
    }

    #[must_use]
    pub fn auth(&self) -> Arc<AuthService> {
        Arc::clone(&self.auth)
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<CatalogService> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn insights(&self) -> Arc<InsightsService> {
        Arc::clone(&self.insights)
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<SessionLauncher> {
        Arc::clone(&self.sessions)
    }
}
