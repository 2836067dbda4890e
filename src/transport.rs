//! Transport Module
//!
//! Single HTTP exchanges with the PawHub API. Every call races an explicit
//! timer; a call that loses the race is abandoned and reported as a timeout.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApiError;

/// Outbound request, addressed by path relative to the API base URL
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// Overrides the client's default request timeout
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a JSON body
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body).map_err(|e| ApiError::Parse(e.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Replace any existing `Authorization` header with a bearer credential.
    pub(crate) fn with_bearer(&self, token: Option<&str>) -> Self {
        let mut request = self.clone();
        request.headers.retain(|(name, _)| !name.eq_ignore_ascii_case("authorization"));
        if let Some(token) = token {
            request.headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }
        request
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Successful (2xx) response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|e| ApiError::Parse(e.to_string()))
    }
}

/// Performs one HTTP exchange.
///
/// Non-2xx responses are returned as `ApiError::Http`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest, timeout: Duration) -> Result<ApiResponse, ApiError>;
}

/// `reqwest`-backed transport
pub struct ReqwestTransport {
    base_url: String,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn exchange(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self.client.request(request.method.clone(), &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let body = response.text().await.map_err(map_reqwest_error)?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.message())
                .unwrap_or_else(|_| format!("Status: {}", status));
            return Err(ApiError::Http { status: status.as_u16(), message });
        }

        Ok(ApiResponse { status: status.as_u16(), body })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest, timeout: Duration) -> Result<ApiResponse, ApiError> {
        debug!(method = %request.method, path = %request.path, ?timeout, "Sending request");

        match tokio::time::timeout(timeout, self.exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(timeout)),
        }
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout(Duration::ZERO)
    } else {
        ApiError::Network(err.to_string())
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Option<String>,
    message: Option<String>,
}

impl ErrorResponse {
    fn message(self) -> String {
        self.error
            .or(self.message)
            .unwrap_or_else(|| "Unknown error".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_replaces_existing_authorization() {
        let request = ApiRequest::get("/pets").header("authorization", "Bearer stale");

        let authorized = request.with_bearer(Some("fresh"));
        assert_eq!(authorized.header_value("Authorization"), Some("Bearer fresh"));
        assert_eq!(authorized.headers.len(), 1);
    }

    #[test]
    fn missing_token_omits_header() {
        let request = ApiRequest::get("/pets").with_bearer(None);
        assert_eq!(request.header_value("Authorization"), None);
    }

    #[test]
    fn response_json_reports_parse_errors() {
        let response = ApiResponse::new(200, "not json");
        let parsed: Result<serde_json::Value, _> = response.json();
        assert!(matches!(parsed, Err(ApiError::Parse(_))));
    }
}
