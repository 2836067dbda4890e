//! Test doubles shared by the unit tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::clock::Clock;
use crate::error::ApiError;
use crate::transport::{ApiRequest, ApiResponse, Transport};

type Handler = Box<dyn Fn(&ApiRequest, usize) -> Result<ApiResponse, ApiError> + Send + Sync>;

/// One request seen by [`ScriptedTransport`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub path: String,
    pub authorization: Option<String>,
    pub timeout: Duration,
}

/// Transport whose answers come from a closure.
///
/// The closure receives the request and the number of earlier calls to
/// the same path.
pub struct ScriptedTransport {
    handler: Handler,
    latency: Vec<(String, Duration)>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new(
        handler: impl Fn(&ApiRequest, usize) -> Result<ApiResponse, ApiError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            latency: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answers every request with `200 {}`
    pub fn always_ok() -> Self {
        Self::new(|_, _| Ok(ApiResponse::new(200, "{}")))
    }

    /// Answers every request with a network error
    pub fn always_down() -> Self {
        Self::new(|_, _| Err(ApiError::Network("connection refused".into())))
    }

    /// Delay answers for `path` by `delay`
    pub fn with_latency(mut self, path: &str, delay: Duration) -> Self {
        self.latency.push((path.to_string(), delay));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.path == path).collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.calls_to(path).len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest, timeout: Duration) -> Result<ApiResponse, ApiError> {
        let previous = {
            let mut calls = self.calls.lock().unwrap();
            let previous = calls.iter().filter(|c| c.path == request.path).count();
            calls.push(RecordedCall {
                path: request.path.clone(),
                authorization: request.header_value("Authorization").map(str::to_string),
                timeout,
            });
            previous
        };

        if let Some((_, delay)) = self.latency.iter().find(|(path, _)| *path == request.path) {
            tokio::time::sleep(*delay).await;
        }

        (self.handler)(request, previous)
    }
}

pub fn http_error(status: u16) -> ApiError {
    ApiError::Http { status, message: format!("Status: {}", status) }
}

/// Clock frozen at a known instant
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn new() -> Self {
        Self(Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
