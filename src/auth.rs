//! Authentication Module
//!
//! Token pair state and single-flight access-token refresh.
//!
//! # States
//! ```text
//! Idle ──first 401──▶ Refreshing ──refresh settles──▶ Idle
//!                        │
//!                        └─ later 401s queue as waiters
//! ```
//! The refresh call runs in its own task, so a caller that gives up does
//! not strand the queue. When it settles the outcome is persisted first,
//! then handed to every waiter in arrival order.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::storage::{TokenKey, TokenStore};
use crate::transport::{ApiRequest, Transport};

/// Access/refresh token pair as kept in storage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    refresh_token: Option<String>,
}

type Waiter = oneshot::Sender<Result<String, ApiError>>;

enum RefreshState {
    Idle,
    Refreshing { waiters: VecDeque<Waiter> },
}

/// Coordinates token refreshes so at most one is in flight
#[derive(Clone)]
pub struct TokenRefresher {
    inner: Arc<RefresherInner>,
}

struct RefresherInner {
    transport: Arc<dyn Transport>,
    store: Arc<dyn TokenStore>,
    refresh_path: String,
    timeout: Duration,
    state: Mutex<RefreshState>,
}

impl TokenRefresher {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn TokenStore>,
        refresh_path: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(RefresherInner {
                transport,
                store,
                refresh_path: refresh_path.into(),
                timeout,
                state: Mutex::new(RefreshState::Idle),
            }),
        }
    }

    /// Obtain a fresh access token after a 401.
    ///
    /// Joins the in-flight refresh if there is one, otherwise starts it.
    /// Resolves only after the outcome has been persisted.
    pub async fn refresh(&self) -> Result<String, ApiError> {
        let (tx, rx) = oneshot::channel();

        let leader = {
            let mut state = lock(&self.inner.state);
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    waiters.push_back(tx);
                    debug!(queued = waiters.len(), "Waiting on in-flight token refresh");
                    false
                }
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing { waiters: VecDeque::from([tx]) };
                    true
                }
            }
        };

        if leader {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                let outcome = inner.perform_refresh().await;
                inner.settle(outcome);
            });
        }

        rx.await
            .unwrap_or_else(|_| Err(ApiError::Network("token refresh was cancelled".into())))
    }

    /// Whether a refresh is currently in flight
    pub fn is_refreshing(&self) -> bool {
        matches!(*lock(&self.inner.state), RefreshState::Refreshing { .. })
    }
}

impl RefresherInner {
    async fn perform_refresh(&self) -> Result<String, ApiError> {
        let outcome = self.request_new_token().await;

        if let Err(e) = &outcome {
            warn!(error = %e, "Token refresh failed, clearing stored tokens");
            if let Err(clear_err) = self.store.clear().await {
                warn!(error = %clear_err, "Failed to clear tokens after refresh failure");
            }
        }
        outcome
    }

    async fn request_new_token(&self) -> Result<String, ApiError> {
        let Some(refresh_token) = self.store.get(TokenKey::Refresh).await? else {
            return Err(ApiError::NoRefreshToken);
        };

        info!("Refreshing access token");
        let request = ApiRequest::post(self.refresh_path.as_str())
            .json(&RefreshRequest { refresh_token: &refresh_token })?;

        let response = match self.transport.send(&request, self.timeout).await {
            Ok(response) => response,
            Err(ApiError::Http { status, .. }) => return Err(ApiError::RefreshRejected { status }),
            Err(e) => return Err(e),
        };
        let body: RefreshResponse = response.json()?;

        // Access token last: once it is visible, nothing left can fail
        if let Some(rotated) = &body.refresh_token {
            self.store.set(TokenKey::Refresh, rotated).await?;
        }
        self.store.set(TokenKey::Access, &body.access_token).await?;

        info!("Access token refreshed");
        Ok(body.access_token)
    }

    fn settle(&self, outcome: Result<String, ApiError>) {
        let waiters = match std::mem::replace(&mut *lock(&self.state), RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => VecDeque::new(),
        };

        debug!(waiters = waiters.len(), ok = outcome.is_ok(), "Token refresh settled");
        for waiter in waiters {
            // A waiter that stopped listening is fine to skip
            let _ = waiter.send(outcome.clone());
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
