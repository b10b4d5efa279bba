//! EspoCRM REST API client.
//!
//! Authenticates against the EspoCRM `accessToken` endpoint and performs
//! generic authenticated JSON calls. The bearer token is cached on the
//! client instance for one hour and refreshed transparently.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{header, Client, Method};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::error::AppError;
use crate::models::EspoCrmConfig;

/// Fixed token lifetime: EspoCRM does not return an expiry, so one hour
/// from issuance is assumed.
const TOKEN_TTL_SECS: i64 = 3600;

/// Errors that can occur when talking to EspoCRM
#[derive(Error, Debug)]
pub enum CrmClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("API request failed: {method} {endpoint}: {message}")]
    Request {
        method: String,
        endpoint: String,
        message: String,
    },

    #[error("Failed to parse response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<CrmClientError> for AppError {
    fn from(err: CrmClientError) -> Self {
        match err {
            CrmClientError::Authentication(msg) => AppError::Authentication(msg),
            CrmClientError::Request {
                method,
                endpoint,
                message,
            } => AppError::RemoteRequest {
                method,
                endpoint,
                message,
            },
            CrmClientError::Http(e) => AppError::RemoteRequest {
                method: "-".into(),
                endpoint: "-".into(),
                message: e.to_string(),
            },
            CrmClientError::Parse(e) => AppError::Json(e),
        }
    }
}

/// Cached bearer token with its computed expiry.
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// EspoCRM REST API client.
///
/// Token state lives on the instance; share the client behind an `Arc` if
/// several callers should reuse one token cache.
pub struct EspoCrmClient {
    client: Client,
    base_url: String,
    username: String,
    api_key: String,
    token: Mutex<Option<CachedToken>>,
}

impl EspoCrmClient {
    /// Create a new client for the given EspoCRM instance.
    pub fn new(
        api_url: &str,
        username: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, CrmClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: api_url.trim_end_matches('/').to_string(),
            username: username.into(),
            api_key: api_key.into(),
            token: Mutex::new(None),
        })
    }

    /// Create a client from a stored configuration.
    pub fn from_config(config: &EspoCrmConfig) -> Result<Self, CrmClientError> {
        Self::new(&config.api_url, &config.username, &config.api_key)
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, endpoint)
    }

    /// Obtain a bearer token, reusing the cached one while it is valid.
    ///
    /// Returns the token; no retry is attempted here — credential rejection
    /// propagates to the caller.
    pub async fn authenticate(&self) -> Result<String, CrmClientError> {
        let mut cached = self.token.lock().await;
        if let Some(entry) = cached.as_ref() {
            if entry.expires_at > Utc::now() {
                return Ok(entry.token.clone());
            }
        }

        let response = self
            .client
            .post(self.endpoint_url("accessToken"))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&json!({
                "username": self.username,
                "apiKey": self.api_key,
            }))
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(CrmClientError::Authentication(message));
        }

        match body.get("token").and_then(Value::as_str) {
            Some(token) => {
                tracing::debug!("EspoCRM token obtained");
                *cached = Some(CachedToken {
                    token: token.to_string(),
                    expires_at: Utc::now() + ChronoDuration::seconds(TOKEN_TTL_SECS),
                });
                Ok(token.to_string())
            }
            None => {
                let message = body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                Err(CrmClientError::Authentication(message.to_string()))
            }
        }
    }

    /// Perform an authenticated JSON request against the EspoCRM API.
    ///
    /// Authenticates first (refreshing an expired token transparently).
    /// Any transport error or non-2xx response surfaces as
    /// `CrmClientError::Request` with method and endpoint context.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Value, CrmClientError> {
        let token = self.authenticate().await?;
        let url = self.endpoint_url(endpoint);

        let mut builder = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&token)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CrmClientError::Request {
                method: method.to_string(),
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| CrmClientError::Request {
            method: method.to_string(),
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(CrmClientError::Request {
                method: method.to_string(),
                endpoint: endpoint.to_string(),
                message: format!("HTTP {status}: {text}"),
            });
        }

        if text.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn get(&self, endpoint: &str) -> Result<Value, CrmClientError> {
        self.request(Method::GET, endpoint, None).await
    }

    pub async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, CrmClientError> {
        self.request(Method::POST, endpoint, Some(body)).await
    }

    pub async fn put(&self, endpoint: &str, body: &Value) -> Result<Value, CrmClientError> {
        self.request(Method::PUT, endpoint, Some(body)).await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<Value, CrmClientError> {
        self.request(Method::DELETE, endpoint, None).await
    }

    /// Verify connectivity and credentials by fetching the current user.
    pub async fn test_connection(&self) -> Result<Value, CrmClientError> {
        self.authenticate().await?;
        self.get("User/me").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_building() {
        let client = EspoCrmClient::new("https://crm.example.com", "admin", "key").unwrap();
        assert_eq!(
            client.endpoint_url("accessToken"),
            "https://crm.example.com/api/v1/accessToken"
        );
        assert_eq!(
            client.endpoint_url("Account/abc123"),
            "https://crm.example.com/api/v1/Account/abc123"
        );
    }

    #[test]
    fn test_trailing_slash_stripped() {
        let client = EspoCrmClient::new("https://crm.example.com/", "admin", "key").unwrap();
        assert_eq!(
            client.endpoint_url("Account"),
            "https://crm.example.com/api/v1/Account"
        );
    }

    #[test]
    fn test_request_error_carries_context() {
        let err = CrmClientError::Request {
            method: "GET".into(),
            endpoint: "Account/xyz".into(),
            message: "HTTP 500 Internal Server Error: boom".into(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("GET"));
        assert!(rendered.contains("Account/xyz"));
    }

    #[test]
    fn test_error_conversion_to_app_error() {
        let err = CrmClientError::Authentication("bad credentials".into());
        let app: AppError = err.into();
        matches!(app, AppError::Authentication(_));
    }
}
