//! Error types for the banking gateway

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Every failure the gateway can produce.
///
/// Errors carry owned strings so they can be cloned: a failed token refresh
/// is handed to every caller that was queued behind it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {

    // =============================
    // Envelope taxonomy
    // =============================

    /// Caller-supplied parameters are missing or malformed. Never reaches the network.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Token acquisition against the platform failed.
    #[error("Authentication error: {message}")]
    Authentication {
        status: Option<u16>,
        message: String,
    },

    /// No response was received (DNS, connection refused, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The platform answered with a non-2xx status or an unreadable body.
    #[error("Upstream error: {message}")]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    #[error("Unexpected error: {0}")]
    Unexpected(String),

    // =============================
    // Startup
    // =============================

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Stable tag for each error class, reported as `errorKind` in envelopes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorKind {
    ValidationError,
    AuthenticationError,
    TransportError,
    UpstreamError,
    UnexpectedError,
}

impl GatewayError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Upstream HTTP status, when the failure originated upstream.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. } | Self::Upstream { status, .. } => *status,
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Authentication { .. } => ErrorKind::AuthenticationError,
            Self::Transport(_) => ErrorKind::TransportError,
            Self::Upstream { .. } => ErrorKind::UpstreamError,
            Self::Unexpected(_) | Self::Configuration(_) => ErrorKind::UnexpectedError,
        }
    }

    /// True when the platform rejected the session token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Upstream { status: Some(401), .. })
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Unexpected(format!("Serialization error: {}", err))
    }
}
