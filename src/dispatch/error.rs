//! Dispatch error taxonomy.

use thiserror::Error;

/// Errors that abort a dispatch before or during the outbound call.
///
/// Non-2xx upstream statuses are not errors; they come back as a
/// [`NormalizedResponse`](crate::dispatch::NormalizedResponse).
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Missing or unusable configuration (no URL, empty URL list, bad URL).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The payload shape does not fit the declared content type.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The transport could not complete the call.
    #[error("Upstream unavailable: {url}: {message}")]
    UpstreamUnavailable { url: String, message: String },
}

impl DispatchError {
    /// Shorthand for a configuration fault.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Shorthand for a payload/content type mismatch.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload(message.into())
    }

    /// Stable label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
        }
    }
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
