//! Shared error types for the services crate.

use thiserror::Error;

use prep_core::model::{AttemptId, QuestionError};
use prep_core::{BufferError, PhaseError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors from talking to the REST backend.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    /// The session could not be refreshed; local auth state was cleared.
    #[error("not signed in")]
    Unauthorized,
    #[error("{message}")]
    Validation { message: String },
    #[error("{message}")]
    AlreadyInProgress {
        message: String,
        existing: Option<AttemptId>,
    },
    #[error("not found")]
    NotFound,
    #[error("request failed with status {0}")]
    Status(u16),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ApiError {
    /// Text for a blocking alert.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => "Could not reach the server. Check your connection.".into(),
            Self::Timeout => "The server took too long to respond. Please try again.".into(),
            Self::Unauthorized => "Your session has expired. Please sign in again.".into(),
            Self::Validation { message } | Self::AlreadyInProgress { message, .. } => {
                message.clone()
            }
            Self::NotFound => "The requested item could not be found.".into(),
            Self::Status(code) if *code >= 500 => {
                "The server ran into a problem. Please try again later.".into()
            }
            Self::Status(code) => format!("Request failed ({code})."),
            Self::Decode(_) => "The server sent an unexpected response.".into(),
            Self::Config(err) => err.to_string(),
        }
    }

    /// Connectivity problems worth retrying as-is.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Status(code) => *code >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Errors in client configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid API url {0}")]
    InvalidApiUrl(String),
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Errors emitted by `AuthService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AuthError {
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(err) => err.user_message(),
            Self::Storage(_) => "Could not save your sign-in on this device.".into(),
            other => other.to_string(),
        }
    }
}

/// Errors emitted by timed answer sessions.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session has no questions")]
    Empty,
    #[error("question position {index} is out of range (0..{len})")]
    OutOfRange { index: usize, len: usize },
    #[error("session was closed")]
    Closed,
    #[error(transparent)]
    Phase(#[from] PhaseError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl SessionError {
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
