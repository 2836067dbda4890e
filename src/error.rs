//! Error Module
//!
//! Error taxonomy shared by the transport, retry and auth layers.

use std::time::Duration;

use crate::storage::StorageError;

/// API errors
///
/// Cloneable so that one refresh outcome can be handed to every caller
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Authentication expired")]
    AuthExpired,

    #[error("No refresh token stored")]
    NoRefreshToken,

    #[error("Token refresh rejected with HTTP {status}")]
    RefreshRejected { status: u16 },

    #[error("Server unavailable after {attempts} attempts")]
    ServerUnavailable { attempts: u32 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Whether the request executor may retry after this error.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Timeout(_) | ApiError::Network(_) => true,
            ApiError::Http { status, .. } => *status == 503,
            _ => false,
        }
    }

    /// Whether this error says something about reachability of the server.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ApiError::Timeout(_) | ApiError::Network(_))
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } | ApiError::RefreshRejected { status } => Some(*status),
            ApiError::AuthExpired => Some(401),
            _ => None,
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Storage(err.to_string())
    }
}
