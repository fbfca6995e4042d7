use std::sync::Arc;

use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use url::Url;

use prep_core::model::AttemptId;

use crate::api::dto::{RefreshRequest, RefreshResponse};
use crate::auth::AuthSession;
use crate::config::ClientConfig;
use crate::error::ApiError;

const REFRESH_PATH: &str = "auth/token/refresh/";

/// JSON client for the REST backend.
///
/// Every call carries the current access token. A 401 triggers exactly one
/// refresh and one retry; a rejected refresh signs the user out.
pub struct ApiClient {
    http: Client,
    config: ClientConfig,
    auth: Arc<AuthSession>,
    refresh_lock: Mutex<()>,
}

impl ApiClient {
    /// Build a client with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns `reqwest::Error` if the HTTP client cannot be constructed.
    pub fn new(config: ClientConfig, auth: Arc<AuthSession>) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            config,
            auth,
            refresh_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn auth(&self) -> &Arc<AuthSession> {
        &self.auth
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `GET` an authenticated resource.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` for transport, status, or decode failures.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(Method::GET, path, &[], None).await
    }

    /// `GET` with query parameters.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` for transport, status, or decode failures.
    pub async fn get_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        self.send(Method::GET, path, query, None).await
    }

    /// `POST` a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` for transport, status, or decode failures.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.send(Method::POST, path, &[], Some(body)).await
    }

    /// `POST` without a body, for action endpoints such as `start/`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` for transport, status, or decode failures.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(Method::POST, path, &[], None).await
    }

    /// `PATCH` a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` for transport, status, or decode failures.
    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        self.send(Method::PATCH, path, &[], Some(body)).await
    }

    /// `POST` without credentials, for login and registration. A 401 here is
    /// a credential problem, not an expired session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` for transport, status, or decode failures.
    pub async fn post_public<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.config.endpoint(path)?;
        tracing::debug!(method = "POST", %url, "api request");
        let response = self.http.post(url).json(body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if status == StatusCode::UNAUTHORIZED {
            let message = serde_json::from_slice::<Value>(&bytes)
                .ok()
                .as_ref()
                .and_then(extract_message)
                .unwrap_or_else(|| "Invalid username or password.".into());
            return Err(ApiError::Validation { message });
        }
        if !status.is_success() {
            return Err(error_from_response(status.as_u16(), &bytes));
        }
        parse_body(&bytes)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let url = self.config.endpoint(path)?;
        let Some(token) = self.auth.access_token() else {
            return Err(ApiError::Unauthorized);
        };

        let response = self
            .dispatch(&method, &url, query, body.as_ref(), &token)
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return decode(response).await;
        }

        tracing::debug!(%url, "access token rejected; refreshing");
        let fresh = self.refresh_access(&token).await?;
        let retry = self
            .dispatch(&method, &url, query, body.as_ref(), &fresh)
            .await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            self.force_logout().await;
            return Err(ApiError::Unauthorized);
        }
        decode(retry).await
    }

    async fn dispatch(
        &self,
        method: &Method,
        url: &Url,
        query: &[(&str, &str)],
        body: Option<&Value>,
        token: &str,
    ) -> Result<Response, ApiError> {
        tracing::debug!(%method, %url, "api request");
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .bearer_auth(token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        tracing::debug!(%method, %url, status = response.status().as_u16(), "api response");
        Ok(response)
    }

    /// Exchange the refresh token for a new access token. Concurrent callers
    /// that saw the same stale token share one refresh.
    async fn refresh_access(&self, stale: &str) -> Result<String, ApiError> {
        let _guard = self.refresh_lock.lock().await;

        match self.auth.access_token() {
            Some(current) if current != stale => return Ok(current),
            Some(_) => {}
            None => return Err(ApiError::Unauthorized),
        }
        let Some(refresh) = self.auth.refresh_token() else {
            self.force_logout().await;
            return Err(ApiError::Unauthorized);
        };

        let url = self.config.endpoint(REFRESH_PATH)?;
        let response = self
            .http
            .post(url)
            .json(&RefreshRequest { refresh: &refresh })
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::info!(
                status = response.status().as_u16(),
                "refresh token rejected"
            );
            self.force_logout().await;
            return Err(ApiError::Unauthorized);
        }

        let body: RefreshResponse = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(error = %err, "malformed refresh response");
                self.force_logout().await;
                return Err(ApiError::Unauthorized);
            }
        };
        if let Err(err) = self
            .auth
            .update_tokens(body.access.clone(), body.refresh)
            .await
        {
            tracing::warn!(error = %err, "could not persist refreshed token");
        }
        Ok(body.access)
    }

    async fn force_logout(&self) {
        tracing::info!("session expired; signing out");
        if let Err(err) = self.auth.teardown().await {
            tracing::warn!(error = %err, "could not clear stored sign-in");
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let bytes = response.bytes().await?;
    if !status.is_success() {
        return Err(error_from_response(status.as_u16(), &bytes));
    }
    parse_body(&bytes)
}

/// Decode a success body. An empty body reads as JSON `null`.
///
/// # Errors
///
/// Returns `ApiError::Decode` if the body does not match `T`.
pub fn parse_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::from_value(Value::Null)?);
    }
    Ok(serde_json::from_slice(bytes)?)
}

/// Map a non-success response to the error taxonomy.
#[must_use]
pub fn error_from_response(status: u16, body: &[u8]) -> ApiError {
    let json = serde_json::from_slice::<Value>(body).ok();
    let message = json.as_ref().and_then(extract_message);
    let existing = json.as_ref().and_then(existing_attempt);

    match status {
        401 => ApiError::Unauthorized,
        404 => ApiError::NotFound,
        409 => ApiError::AlreadyInProgress {
            message: message.unwrap_or_else(|| "This session is already in progress.".into()),
            existing,
        },
        400 | 422 if existing.is_some() => ApiError::AlreadyInProgress {
            message: message.unwrap_or_else(|| "This session is already in progress.".into()),
            existing,
        },
        400 | 422 => ApiError::Validation {
            message: message.unwrap_or_else(|| "The request was rejected.".into()),
        },
        403 if message.is_some() => ApiError::Validation {
            message: message.unwrap_or_default(),
        },
        other => ApiError::Status(other),
    }
}

/// Human text from an error body: `error`, `detail` or `message` strings,
/// else field errors as `field: reason`.
#[must_use]
pub fn extract_message(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(extract_message).collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        }
        Value::Object(map) => {
            for key in ["error", "detail", "message"] {
                if let Some(text) = map.get(key).and_then(extract_message) {
                    return Some(text);
                }
            }
            let parts: Vec<String> = map
                .iter()
                .filter_map(|(field, v)| {
                    let text = extract_message(v)?;
                    Some(if field == "non_field_errors" {
                        text
                    } else {
                        format!("{field}: {text}")
                    })
                })
                .collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        _ => None,
    }
}

fn existing_attempt(value: &Value) -> Option<AttemptId> {
    let raw = value.get("attempt_id")?;
    raw.as_u64()
        .or_else(|| raw.as_str().and_then(|s| s.trim().parse().ok()))
        .map(AttemptId::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: &Value) -> Vec<u8> {
        serde_json::to_vec(value).unwrap()
    }

    #[test]
    fn in_progress_conflict_carries_existing_attempt() {
        let err = error_from_response(
            400,
            &body(&json!({
                "error": "You already have an in-progress attempt for this exam",
                "attempt_id": 41
            })),
        );
        match err {
            ApiError::AlreadyInProgress { message, existing } => {
                assert!(message.contains("in-progress attempt"));
                assert_eq!(existing, Some(AttemptId::new(41)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn field_errors_become_validation_messages() {
        let err = error_from_response(
            400,
            &body(&json!({"password": ["This password is too short."]})),
        );
        assert!(matches!(
            err,
            ApiError::Validation { ref message } if message == "password: This password is too short."
        ));

        let err = error_from_response(
            400,
            &body(&json!({"non_field_errors": ["Passwords do not match."]})),
        );
        assert_eq!(err.user_message(), "Passwords do not match.");
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(error_from_response(401, b""), ApiError::Unauthorized));
        assert!(matches!(
            error_from_response(404, b"{\"detail\":\"Not found.\"}"),
            ApiError::NotFound
        ));
        assert!(matches!(
            error_from_response(409, b""),
            ApiError::AlreadyInProgress { existing: None, .. }
        ));
        assert!(matches!(error_from_response(500, b"<html>"), ApiError::Status(500)));
        assert!(matches!(error_from_response(403, b""), ApiError::Status(403)));
        assert!(matches!(
            error_from_response(403, b"{\"error\":\"Premium required\"}"),
            ApiError::Validation { .. }
        ));
    }

    #[test]
    fn empty_body_reads_as_null() {
        let value: Value = parse_body(b"").unwrap();
        assert_eq!(value, Value::Null);
        let unit: Option<u32> = parse_body(b"  ").unwrap();
        assert_eq!(unit, None);
        assert!(matches!(
            parse_body::<u32>(b"{\"a\":1}"),
            Err(ApiError::Decode(_))
        ));
    }

    #[test]
    fn attempt_id_may_be_a_string() {
        assert_eq!(
            existing_attempt(&json!({"attempt_id": "12"})),
            Some(AttemptId::new(12))
        );
        assert_eq!(existing_attempt(&json!({"error": "x"})), None);
    }
}
