//! API Client Module
//!
//! The single entry point the rest of the app uses to talk to the PawHub
//! API. Attaches the bearer token, turns a 401 into one refresh-and-retry,
//! records every response as liveness evidence, and exposes the server
//! monitoring, wake and keep-alive controls.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::auth::{TokenPair, TokenRefresher};
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::health::{HealthMonitor, ServerStatus};
use crate::keepalive::{ForegroundSignal, KeepAlive};
use crate::retry::{self, RetryPolicy};
use crate::storage::{TokenKey, TokenStore};
use crate::transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport};
use crate::wake::WakeSequencer;

/// API client for the PawHub backend
///
/// Construct once and share for the life of the process; call
/// [`ApiClient::shutdown`] to stop its background tasks.
pub struct ApiClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    store: Arc<dyn TokenStore>,
    monitor: Arc<HealthMonitor>,
    wake: WakeSequencer,
    keep_alive: KeepAlive,
    refresher: TokenRefresher,
    retry_policy: RetryPolicy,
}

impl ApiClient {
    /// Create a client backed by `reqwest`
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn TokenStore>,
        foreground: Arc<dyn ForegroundSignal>,
    ) -> Result<Self, ApiError> {
        let transport = Arc::new(ReqwestTransport::new(&config.base_url)?);
        Ok(Self::with_transport(config, transport, store, foreground))
    }

    /// Create a client over a caller-supplied transport
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn TokenStore>,
        foreground: Arc<dyn ForegroundSignal>,
    ) -> Self {
        Self::with_clock(config, transport, store, foreground, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn TokenStore>,
        foreground: Arc<dyn ForegroundSignal>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = config.normalized();
        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&transport),
            clock,
            config.health.clone(),
        ));
        let wake = WakeSequencer::new(Arc::clone(&monitor), config.wake.clone());
        let keep_alive = KeepAlive::new(Arc::clone(&monitor), foreground, config.keep_alive.interval);
        let refresher = TokenRefresher::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            config.refresh_path.clone(),
            config.request_timeout,
        );
        let retry_policy = RetryPolicy::from(&config.retry);

        Self {
            config,
            transport,
            store,
            monitor,
            wake,
            keep_alive,
            refresher,
            retry_policy,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // Requests

    /// Send an authenticated request.
    ///
    /// A 401 triggers one token refresh and one retry; a second 401 is
    /// `ApiError::AuthExpired`. Nothing else is retried here.
    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let timeout = request.timeout.unwrap_or(self.config.request_timeout);
        self.dispatch(&request, timeout, &AtomicBool::new(false)).await
    }

    /// [`ApiClient::request`] with progressive-timeout retries.
    ///
    /// The 401 recovery is shared by every attempt: once a refresh has been
    /// spent on this request, a later 401 is `ApiError::AuthExpired`.
    pub async fn request_with_retry(
        &self,
        request: ApiRequest,
        max_retries: u32,
    ) -> Result<ApiResponse, ApiError> {
        let request = &request;
        let refreshed = &AtomicBool::new(false);
        retry::execute_with_retry(&self.retry_policy, max_retries, move |timeout| {
            self.dispatch(request, timeout, refreshed)
        })
        .await
    }

    /// Run any attempt function under the client's retry policy
    pub async fn execute_with_retry<T, F, Fut>(&self, attempt: F, max_retries: u32) -> Result<T, ApiError>
    where
        F: FnMut(Duration) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        retry::execute_with_retry(&self.retry_policy, max_retries, attempt).await
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        timeout: Duration,
        refreshed: &AtomicBool,
    ) -> Result<ApiResponse, ApiError> {
        let token = self.store.get(TokenKey::Access).await?;

        match self.send_observed(request, token.as_deref(), timeout).await {
            Err(ApiError::Http { status: 401, .. }) => {}
            other => return other,
        }

        if refreshed.swap(true, Ordering::SeqCst) {
            warn!(path = %request.path, "Unauthorized again after token refresh");
            return Err(ApiError::AuthExpired);
        }

        let fresh = self.token_after_unauthorized(request, token.as_deref()).await?;

        match self.send_observed(request, Some(&fresh), timeout).await {
            Err(ApiError::Http { status: 401, .. }) => {
                warn!(path = %request.path, "Still unauthorized after token refresh");
                Err(ApiError::AuthExpired)
            }
            other => other,
        }
    }

    /// Token to retry a 401 with. Joins an in-flight refresh; reuses a token
    /// that a settled refresh stored after `sent` went out; otherwise
    /// starts a refresh.
    async fn token_after_unauthorized(
        &self,
        request: &ApiRequest,
        sent: Option<&str>,
    ) -> Result<String, ApiError> {
        if !self.refresher.is_refreshing() {
            if let Some(current) = self.store.get(TokenKey::Access).await? {
                if sent != Some(current.as_str()) {
                    debug!(path = %request.path, "Retrying with token refreshed elsewhere");
                    return Ok(current);
                }
            }
        }
        self.refresher.refresh().await
    }

    async fn send_observed(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<ApiResponse, ApiError> {
        let authorized = request.with_bearer(token);
        let result = self.transport.send(&authorized, timeout).await;

        match &result {
            Ok(_) => self.monitor.record_success(),
            Err(e) if e.is_connectivity() => {
                debug!(path = %request.path, error = %e, "Request failed to reach server");
                self.monitor.record_failure();
            }
            Err(_) => {}
        }
        result
    }

    // Tokens

    /// Store tokens after login
    pub async fn set_tokens(&self, tokens: &TokenPair) -> Result<(), ApiError> {
        self.store.store_pair(tokens).await?;
        info!("Tokens stored");
        Ok(())
    }

    pub async fn access_token(&self) -> Result<Option<String>, ApiError> {
        Ok(self.store.get(TokenKey::Access).await?)
    }

    /// Forget both tokens
    pub async fn logout(&self) -> Result<(), ApiError> {
        info!("Logging out");
        self.store.clear().await?;
        Ok(())
    }

    // Server controls

    pub fn start_server_monitoring(&self) {
        self.monitor.start_monitoring();
    }

    pub fn stop_server_monitoring(&self) {
        self.monitor.stop_monitoring();
    }

    pub fn server_status(&self) -> ServerStatus {
        self.monitor.status()
    }

    pub async fn check_health(&self, timeout: Duration) -> bool {
        self.monitor.check_health(timeout).await
    }

    pub async fn wait_for_server(&self, max_retries: u32, initial_delay: Duration) -> bool {
        self.monitor.wait_for_server(max_retries, initial_delay).await
    }

    pub async fn wake_server_sequence(&self) -> bool {
        self.wake.wake().await
    }

    /// Wake sequence as a `Result`
    pub async fn ensure_server_awake(&self) -> Result<(), ApiError> {
        if self.wake.wake().await {
            Ok(())
        } else {
            Err(ApiError::ServerUnavailable { attempts: self.config.wake.pings })
        }
    }

    pub fn start_keep_alive(&self) {
        self.keep_alive.start();
    }

    pub fn stop_keep_alive(&self) {
        self.keep_alive.stop();
    }

    /// Stop all background activity. Returns whether anything was running.
    pub fn shutdown(&self) -> bool {
        let running = self.keep_alive.is_running() || self.monitor.is_monitoring();
        self.keep_alive.stop();
        self.monitor.stop_monitoring();
        if running {
            info!("API client shut down");
        }
        running
    }
}

impl Drop for ApiClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
