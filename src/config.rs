//! Session configuration types

use crate::endpoint::Modality;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Control channel label must not be empty
    #[error("control channel label must not be empty")]
    EmptyControlLabel,

    /// Close grace delay out of range
    #[error("close grace delay {0}ms exceeds the 10s bound")]
    CloseGraceTooLong(u64),

    /// ICE fallback timer must not be zero
    #[error("ice fallback timeout must be greater than zero")]
    ZeroIceFallback,
}

/// How the negotiator waits for ICE candidate gathering to settle
///
/// Some engines are known not to emit a terminal gathering event; callers
/// targeting one of those opt into a fallback timer instead of identifying
/// the engine here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IceWaitPolicy {
    /// Wait until the endpoint reports `Complete` (default)
    #[default]
    WaitForComplete,

    /// Race completion against a fallback timer; whichever fires first
    /// unblocks negotiation
    FallbackAfter {
        /// Fallback delay in milliseconds
        timeout_ms: u64,
    },
}

impl IceWaitPolicy {
    /// Conventional fallback delay for misbehaving engines
    pub const DEFAULT_FALLBACK_MS: u64 = 3000;

    /// Fallback policy with the conventional delay
    pub fn fallback() -> Self {
        IceWaitPolicy::FallbackAfter {
            timeout_ms: Self::DEFAULT_FALLBACK_MS,
        }
    }
}

/// Per-session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Media type of the session
    pub modality: Modality,

    /// Send-parameter overrides shallow-merged onto each attached track
    pub rtp_overrides: Map<String, Value>,

    /// ICE gathering wait policy
    pub ice_wait: IceWaitPolicy,

    /// Grace delay before closing the transport on stop, letting in-flight
    /// close signaling flush
    pub close_grace_ms: u64,

    /// Label of the control data channel
    pub control_channel_label: String,
}

fn default_close_grace_ms() -> u64 {
    500
}

fn default_control_channel_label() -> String {
    "text".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            modality: Modality::Video,
            rtp_overrides: Map::new(),
            ice_wait: IceWaitPolicy::default(),
            close_grace_ms: default_close_grace_ms(),
            control_channel_label: default_control_channel_label(),
        }
    }
}

impl SessionConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control_channel_label.is_empty() {
            return Err(ConfigError::EmptyControlLabel);
        }
        if self.close_grace_ms > 10_000 {
            return Err(ConfigError::CloseGraceTooLong(self.close_grace_ms));
        }
        if let IceWaitPolicy::FallbackAfter { timeout_ms: 0 } = self.ice_wait {
            return Err(ConfigError::ZeroIceFallback);
        }
        Ok(())
    }

    /// Close grace delay as a [`Duration`]
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.modality, Modality::Video);
        assert_eq!(config.ice_wait, IceWaitPolicy::WaitForComplete);
        assert_eq!(config.close_grace_ms, 500);
        assert_eq!(config.control_channel_label, "text");
        assert!(config.rtp_overrides.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let config = SessionConfig {
            control_channel_label: String::new(),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyControlLabel));

        let config = SessionConfig {
            close_grace_ms: 60_000,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::CloseGraceTooLong(60_000)));

        let config = SessionConfig {
            ice_wait: IceWaitPolicy::FallbackAfter { timeout_ms: 0 },
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroIceFallback));
    }

    #[test]
    fn test_ice_wait_serde() {
        let policy = IceWaitPolicy::fallback();
        let value = serde_json::to_value(policy).unwrap();
        assert_eq!(value, json!({"mode": "fallback_after", "timeout_ms": 3000}));

        let parsed: SessionConfig = serde_json::from_value(json!({
            "modality": "audio",
            "ice_wait": {"mode": "wait_for_complete"}
        }))
        .unwrap();
        assert_eq!(parsed.modality, Modality::Audio);
        assert_eq!(parsed.ice_wait, IceWaitPolicy::WaitForComplete);
        assert_eq!(parsed.close_grace_ms, 500);
    }
}
