//! Relay error taxonomy
//!
//! - Upstream handshake failures carry the provider's status and body
//! - Mid-stream read failures end the relay with an error frame
//! - Client disconnects end the relay silently

use std::time::Duration;
use thiserror::Error;

/// Failures talking to the model provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Provider answered the handshake with a non-success status
    #[error("Provider API error {status}: {body}")]
    Status { status: u16, body: String },

    /// Request never reached the provider (DNS, connect, TLS, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Stream broke after the handshake succeeded
    #[error("Upstream stream error: {0}")]
    Read(String),
}

/// Reasons a relay ends without a completion frame
#[derive(Error, Debug)]
pub enum RelayError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("Relay exceeded maximum duration of {}s", .0.as_secs())]
    TimedOut(Duration),

    /// The client stopped reading; nothing more can be delivered
    #[error("Client disconnected")]
    ClientDisconnected,

    #[error("Relay failed unexpectedly")]
    Panicked,
}

impl RelayError {
    /// Category for logging
    pub fn category(&self) -> &'static str {
        match self {
            RelayError::Upstream(UpstreamError::Status { .. }) => "upstream_status",
            RelayError::Upstream(UpstreamError::Network(_)) => "network",
            RelayError::Upstream(UpstreamError::Read(_)) => "upstream_read",
            RelayError::TimedOut(_) => "timeout",
            RelayError::ClientDisconnected => "client_disconnected",
            RelayError::Panicked => "panic",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_message_includes_status_and_body() {
        let err = UpstreamError::Status {
            status: 429,
            body: r#"{"error":"rate limited"}"#.to_string(),
        };
        assert_eq!(
            err.to_string(),
            r#"Provider API error 429: {"error":"rate limited"}"#
        );
    }

    #[test]
    fn test_relay_error_is_transparent_over_upstream() {
        let err: RelayError = UpstreamError::Network("connection refused".to_string()).into();
        assert_eq!(err.to_string(), "Network error: connection refused");
        assert_eq!(err.category(), "network");
    }

    #[test]
    fn test_timeout_message() {
        let err = RelayError::TimedOut(Duration::from_secs(90));
        assert_eq!(err.to_string(), "Relay exceeded maximum duration of 90s");
        assert_eq!(err.category(), "timeout");
    }
}
