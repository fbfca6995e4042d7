use std::env;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api/v1";
pub const DEFAULT_DB_URL: &str = "sqlite://prep.sqlite3";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Client settings resolved from the environment and CLI overrides.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    api_base: Url,
    pub db_url: String,
    pub timeout: Duration,
    /// Send each answer to the backend as soon as it changes.
    pub autosave: bool,
}

impl ClientConfig {
    /// Settings with defaults and the given API base URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidApiUrl` if `api_base` is not an http(s) URL.
    pub fn new(api_base: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_base: parse_base(api_base)?,
            db_url: DEFAULT_DB_URL.to_owned(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            autosave: true,
        })
    }

    /// Read `PREP_API_URL`, `PREP_DB_URL`, `PREP_HTTP_TIMEOUT_SECS` and
    /// `PREP_AUTOSAVE`, falling back to defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Self::from_env`] with an injectable variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a variable is set but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api = get("PREP_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into());
        let mut config = Self::new(&api)?;

        if let Some(db_url) = get("PREP_DB_URL") {
            config.db_url = db_url;
        }
        if let Some(raw) = get("PREP_HTTP_TIMEOUT_SECS") {
            let secs = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "PREP_HTTP_TIMEOUT_SECS",
                    value: raw.clone(),
                })?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = get("PREP_AUTOSAVE") {
            config.autosave = parse_flag(&raw).ok_or(ConfigError::InvalidValue {
                key: "PREP_AUTOSAVE",
                value: raw,
            })?;
        }
        Ok(config)
    }

    /// Replace the API base URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidApiUrl` if `api_base` is not an http(s) URL.
    pub fn with_api_base(mut self, api_base: &str) -> Result<Self, ConfigError> {
        self.api_base = parse_base(api_base)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_db_url(mut self, db_url: impl Into<String>) -> Self {
        self.db_url = db_url.into();
        self
    }

    #[must_use]
    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// Absolute URL for an API path such as `exams/3/start/`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidApiUrl` if the joined URL is invalid.
    pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
        join_endpoint(&self.api_base, path)
    }
}

/// Join `path` onto `base`, keeping every segment of the base path.
///
/// # Errors
///
/// Returns `ConfigError::InvalidApiUrl` if the joined URL is invalid.
pub fn join_endpoint(base: &Url, path: &str) -> Result<Url, ConfigError> {
    base.join(path.trim_start_matches('/'))
        .map_err(|e| ConfigError::InvalidApiUrl(format!("{base}{path}: {e}")))
}

// Url::join drops the last segment unless the base ends with a slash.
fn parse_base(raw: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim();
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_owned()
    } else {
        format!("{trimmed}/")
    };
    let url = Url::parse(&normalized)
        .map_err(|e| ConfigError::InvalidApiUrl(format!("{trimmed}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidApiUrl(format!(
            "{trimmed}: unsupported scheme {other}"
        ))),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_env_is_empty() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_base().as_str(), "http://127.0.0.1:8000/api/v1/");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.db_url, DEFAULT_DB_URL);
        assert!(config.autosave);
    }

    #[test]
    fn endpoints_keep_the_base_path() {
        let config = ClientConfig::new("https://prep.example.com/api/v1").unwrap();
        assert_eq!(
            config.endpoint("exams/3/start/").unwrap().as_str(),
            "https://prep.example.com/api/v1/exams/3/start/"
        );
        assert_eq!(
            config.endpoint("/auth/login/").unwrap().as_str(),
            "https://prep.example.com/api/v1/auth/login/"
        );
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("PREP_API_URL", "https://api.example.com/v2/"),
            ("PREP_DB_URL", "sqlite::memory:"),
            ("PREP_HTTP_TIMEOUT_SECS", "30"),
            ("PREP_AUTOSAVE", "off"),
        ]))
        .unwrap();
        assert_eq!(config.api_base().as_str(), "https://api.example.com/v2/");
        assert_eq!(config.db_url, "sqlite::memory:");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(!config.autosave);
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("PREP_HTTP_TIMEOUT_SECS", "0")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[("PREP_AUTOSAVE", "maybe")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            ClientConfig::new("ftp://example.com"),
            Err(ConfigError::InvalidApiUrl(_))
        ));
        assert!(matches!(
            ClientConfig::new("not a url"),
            Err(ConfigError::InvalidApiUrl(_))
        ));
    }
}
