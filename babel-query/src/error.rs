//! Error types for babel-query
//!
//! Failures never cross provider boundaries or the detection/dispatch
//! boundary. Stale results are not errors: they are dropped on arrival.

use thiserror::Error;

/// One detector unreachable or malformed (isolated, non-fatal)
#[derive(Debug, Error)]
pub enum DetectorError {
    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Detector answered with an error status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response
    #[error("Parse error: {0}")]
    Parse(String),

    /// Detector answered without a usable language code
    #[error("Empty language code")]
    EmptyCode,
}

/// Provider call outcome other than success
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Recoverable: retried after the fixed backoff, never reported to the user
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Reported once as a user-visible notification
    #[error("Provider failed ({code}): {message}")]
    Failed { code: String, message: String },

    /// Call aborted because its request was superseded
    #[error("Cancelled")]
    Cancelled,
}

impl ProviderError {
    pub fn failed(code: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError::Failed {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable code for notifications
    pub fn code(&self) -> &str {
        match self {
            ProviderError::RateLimited(_) => "rate_limited",
            ProviderError::Failed { code, .. } => code,
            ProviderError::Cancelled => "cancelled",
        }
    }
}

/// Orchestrator-level errors
#[derive(Debug, Error)]
pub enum QueryError {
    /// Configuration enables no registered provider
    #[error("No providers enabled")]
    NoProvidersEnabled,

    /// Query text is empty after trimming
    #[error("Query text is empty")]
    EmptyQuery,

    /// Orchestrator event loop has stopped
    #[error("Orchestrator is closed")]
    Closed,

    /// babel-common error
    #[error("Common error: {0}")]
    Common(#[from] babel_common::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_codes() {
        assert_eq!(ProviderError::RateLimited("429".into()).code(), "rate_limited");
        assert_eq!(ProviderError::failed("503", "down").code(), "503");
        assert_eq!(ProviderError::Cancelled.code(), "cancelled");
        assert_eq!(
            ProviderError::failed("503", "down").to_string(),
            "Provider failed (503): down"
        );
    }
}
