//! Error types for session negotiation
//!
//! Transport-level informational conditions (ICE/connection/signaling state
//! changes) are never errors and are only logged. Likewise a non-JSON control
//! message is not an error: it degrades to raw-text delivery in
//! [`crate::control`]. Everything that can actually fail a session start is
//! collected here.

use serde_json::Value;
use thiserror::Error;

/// Error type for session negotiation
#[derive(Debug, Error)]
pub enum Error {
    /// Local media capture failed (raised by the media subsystem, propagated unchanged)
    #[error("media acquisition failed: {0}")]
    MediaAcquisition(String),

    /// The remote exchange reported a failure status; carries the original
    /// response payload so callers can surface the server-supplied reason
    #[error("negotiation rejected by remote")]
    NegotiationRejected {
        /// Full response body as returned by the remote exchange
        payload: Value,
    },

    /// The remote exchange call itself failed (network-level)
    #[error("signaling transport error: {0}")]
    SignalingTransport(String),

    /// A peer endpoint operation failed
    #[error("transport error: {0}")]
    Transport(String),

    /// An internal event stream closed while a wait was outstanding
    #[error("endpoint event stream closed")]
    ChannelClosed,

    /// Configuration validation failed
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a media acquisition error
    pub fn media(msg: impl Into<String>) -> Self {
        Error::MediaAcquisition(msg.into())
    }

    /// Create a signaling transport error
    pub fn signaling(msg: impl Into<String>) -> Self {
        Error::SignalingTransport(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }
}

/// Result type for session negotiation operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_display() {
        let err = Error::signaling("connection refused");
        assert_eq!(err.to_string(), "signaling transport error: connection refused");

        let err = Error::transport("offer failed");
        assert_eq!(err.to_string(), "transport error: offer failed");
    }

    #[test]
    fn test_rejection_keeps_payload() {
        let payload = json!({"status": "failed", "meta": {"error": "concurrency_limit_reached"}});
        let err = Error::NegotiationRejected {
            payload: payload.clone(),
        };
        match err {
            Error::NegotiationRejected { payload: p } => assert_eq!(p, payload),
            other => panic!("unexpected error: {other}"),
        }
    }
}
