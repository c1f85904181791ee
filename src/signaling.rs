//! Remote exchange call contract
//!
//! The signaling transport itself (HTTP, WebSocket, anything that can carry a
//! JSON body) is the caller's concern: the negotiator only needs one call
//! that submits the completed local offer and resolves to the server's raw
//! response body.

use crate::endpoint::{SdpKind, SessionDescription};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;

/// Body of the remote-exchange call: the completed local offer plus the
/// session identifier the server keys its state on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferPayload {
    /// Offer description body
    pub sdp: String,
    /// Description type; serialized as `type` on the wire
    #[serde(rename = "type")]
    pub kind: SdpKind,
    /// Opaque session identifier
    pub session_id: String,
}

impl OfferPayload {
    /// Build the payload from a completed local description
    pub fn new(desc: &SessionDescription, session_id: impl Into<String>) -> Self {
        Self {
            sdp: desc.sdp.clone(),
            kind: desc.kind,
            session_id: session_id.into(),
        }
    }
}

/// Classified result of one remote-exchange call
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingReply {
    /// The remote answer description
    Answer(SessionDescription),
    /// The server reported failure; carries the full response payload
    Rejected(Value),
}

impl SignalingReply {
    /// Classify a raw exchange result. A body with `status: "failed"` is a
    /// rejection regardless of its other fields; anything else must parse as
    /// a `(type, sdp)` description.
    pub fn from_value(value: Value) -> Result<SignalingReply> {
        if value.get("status").and_then(Value::as_str) == Some("failed") {
            return Ok(SignalingReply::Rejected(value));
        }
        let desc: SessionDescription = serde_json::from_value(value)?;
        Ok(SignalingReply::Answer(desc))
    }
}

/// The caller-supplied signaling transport
#[async_trait]
pub trait SignalingExchange: Send + Sync {
    /// Submit the local offer; resolves to the raw response body. Transport
    /// failures map to [`crate::Error::SignalingTransport`].
    async fn exchange(&self, offer: OfferPayload) -> Result<Value>;
}

/// Adapter letting a plain async closure act as the exchange
pub struct FnExchange<F>(pub F);

#[async_trait]
impl<F, Fut> SignalingExchange for FnExchange<F>
where
    F: Fn(OfferPayload) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send,
{
    async fn exchange(&self, offer: OfferPayload) -> Result<Value> {
        (self.0)(offer).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_wire_format() {
        let desc = SessionDescription {
            kind: SdpKind::Offer,
            sdp: "v=0\r\n".to_string(),
        };
        let payload = OfferPayload::new(&desc, "abc");
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            json!({"sdp": "v=0\r\n", "type": "offer", "session_id": "abc"})
        );
    }

    #[test]
    fn test_reply_classification() {
        let reply =
            SignalingReply::from_value(json!({"type": "answer", "sdp": "v=0\r\n"})).unwrap();
        assert_eq!(
            reply,
            SignalingReply::Answer(SessionDescription {
                kind: SdpKind::Answer,
                sdp: "v=0\r\n".to_string(),
            })
        );

        let body = json!({"status": "failed", "meta": {"error": "concurrency_limit_reached"}});
        let reply = SignalingReply::from_value(body.clone()).unwrap();
        assert_eq!(reply, SignalingReply::Rejected(body));
    }

    #[test]
    fn test_reply_rejects_garbage() {
        assert!(SignalingReply::from_value(json!({"status": "ok"})).is_err());
        assert!(SignalingReply::from_value(json!("nonsense")).is_err());
    }
}
