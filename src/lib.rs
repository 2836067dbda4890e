//! PawHub Connect Library
//!
//! Resilient client for the PawHub marketplace API: progressive-timeout
//! retries, server health monitoring, wake-up and keep-alive pings for a
//! backend that sleeps when idle, and single-flight token refresh.

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod keepalive;
pub mod logging;
pub mod retry;
pub mod storage;
pub mod transport;
pub mod wake;

#[cfg(test)]
mod testing;

pub use api::ApiClient;
pub use auth::TokenPair;
pub use config::ClientConfig;
pub use error::ApiError;
pub use health::ServerStatus;
pub use keepalive::{ForegroundSignal, ForegroundState};
pub use storage::{MemoryTokenStore, SecureStorage, TokenStore};
pub use transport::{ApiRequest, ApiResponse, Transport};
