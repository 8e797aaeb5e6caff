//! Error types for requests against the firewall service
//!
//! Every caller recovers from a failed request the same way (report it for the
//! affected section, keep the previous state, keep polling), so transport
//! problems collapse into a single variant carrying a readable reason.

use log::warn;
use thiserror::Error;

/// Failure of a single request or a rejected input
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    /// Connectivity problem, timeout, non-2xx status or an unreadable body
    #[error("{endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    /// Input rejected locally before any request was sent
    #[error("invalid input: {0}")]
    Validation(String),
}

impl ApiError {
    /// Creates a transport failure and logs it
    pub fn transport(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let reason = reason.into();
        warn!("Request to {} failed: {}", endpoint, reason);
        ApiError::Transport { endpoint, reason }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        ApiError::Validation(reason.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ApiError::Validation(_))
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
