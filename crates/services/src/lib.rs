#![forbid(unsafe_code)]

pub mod api;
pub mod app_services;
pub mod auth;
pub mod auth_service;
pub mod catalog;
pub mod config;
pub mod error;
pub mod insights;
pub mod session;

pub use prep_core::Clock;

pub use api::ApiClient;
pub use app_services::AppServices;
pub use auth::AuthSession;
pub use auth_service::AuthService;
pub use catalog::{CatalogService, InterviewScope};
pub use config::ClientConfig;
pub use error::{ApiError, AppServicesError, AuthError, ConfigError, SessionError};
pub use insights::{InsightsService, TrendPeriod};
pub use session::{
    CountdownTimer, ExamEndpoints, InterviewEndpoints, LoadedSession, Progress, SessionController,
    SessionEndpoints, SessionLauncher, SessionOptions, SubmitFailure,
};
