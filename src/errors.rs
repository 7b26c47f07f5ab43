//! Error types for the health monitor

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MonitorError>;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// A network operation exceeded its hard timeout
    #[error("Request timeout")]
    Timeout,

    /// DNS, connect, reset or body failure
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// The upstream resource does not exist or is inaccessible
    #[error("{0}")]
    UpstreamNotFound(String),

    /// The upstream API refused the request because of rate limiting
    #[error("Upstream rate limit exceeded")]
    UpstreamRateLimited,

    /// An auxiliary sub-fetch failed; the snapshot is still usable
    #[error("Partial data unavailable: {0}")]
    PartialDataUnavailable(String),

    /// Malformed URL or identifier, rejected before any network call
    #[error("Invalid input: {0}")]
    ValidationFailure(String),

    /// The mandatory fetch failed and no snapshot was produced
    #[error("Poll failed: {0}")]
    TotalPollFailure(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client error that has not been classified yet
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serializable tag for a [`MonitorError`], carried by results that outlive the error itself.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    NetworkFailure,
    UpstreamNotFound,
    UpstreamRateLimited,
    PartialDataUnavailable,
    ValidationFailure,
    TotalPollFailure,
    Config,
}

impl MonitorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MonitorError::Timeout => ErrorKind::Timeout,
            MonitorError::NetworkFailure(_) => ErrorKind::NetworkFailure,
            MonitorError::UpstreamNotFound(_) => ErrorKind::UpstreamNotFound,
            MonitorError::UpstreamRateLimited => ErrorKind::UpstreamRateLimited,
            MonitorError::PartialDataUnavailable(_) => ErrorKind::PartialDataUnavailable,
            MonitorError::ValidationFailure(_) => ErrorKind::ValidationFailure,
            MonitorError::TotalPollFailure(_) => ErrorKind::TotalPollFailure,
            MonitorError::Config(_) => ErrorKind::Config,
            MonitorError::Http(err) => classify_reqwest_error(err).kind(),
            MonitorError::Json(_) => ErrorKind::PartialDataUnavailable,
        }
    }

    /// Reclassify a raw HTTP client error into the monitor taxonomy.
    pub fn classified(self) -> Self {
        match self {
            MonitorError::Http(err) => classify_reqwest_error(&err),
            other => other,
        }
    }
}

/// Map a `reqwest::Error` onto the taxonomy. Timeouts stay distinct from other
/// connection failures.
pub fn classify_reqwest_error(error: &reqwest::Error) -> MonitorError {
    if error.is_timeout() {
        return MonitorError::Timeout;
    }

    if let Some(status) = error.status() {
        if status == StatusCode::NOT_FOUND {
            return MonitorError::UpstreamNotFound(error.to_string());
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return MonitorError::UpstreamRateLimited;
        }
    }

    let description = if error.is_connect() {
        format!("connection failed: {}", error)
    } else if error.is_redirect() {
        format!("redirect failed: {}", error)
    } else if error.is_body() || error.is_decode() {
        format!("response body failed: {}", error)
    } else {
        error.to_string()
    };

    MonitorError::NetworkFailure(description)
}
