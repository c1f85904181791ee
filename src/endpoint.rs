//! The injected peer-transport abstraction
//!
//! The negotiation core never constructs a peer connection itself: callers
//! hand it anything that satisfies [`PeerEndpoint`]. [`crate::rtc::RtcEndpoint`]
//! is the production implementation over the `webrtc` crate; tests drive the
//! same seam with scripted mocks.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// A session's media type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// Audio session
    Audio,
    /// Video session
    #[default]
    Video,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Audio => write!(f, "audio"),
            Modality::Video => write!(f, "video"),
        }
    }
}

/// Which half of the description exchange a blob is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// Local offer
    Offer,
    /// Remote answer
    Answer,
}

/// An opaque (type, body) session description pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Description type (offer or answer); serialized as `type` on the wire
    #[serde(rename = "type")]
    pub kind: SdpKind,
    /// Session description body
    pub sdp: String,
}

/// ICE candidate gathering progress as reported by the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IceGatheringState {
    /// Gathering has not started
    #[default]
    New,
    /// Candidates are being gathered
    Gathering,
    /// Gathering reached a terminal state
    Complete,
}

/// Transport-level send parameters for one track attachment
///
/// Kept as an open record rather than a closed struct: overrides are opaque
/// hints (bitrate, codec preferences) shallow-merged over whatever the
/// endpoint currently reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendParameters(pub Map<String, Value>);

impl SendParameters {
    /// Shallow-merge `overrides` into these parameters; override keys replace
    /// existing ones, other keys are left untouched.
    pub fn merge_overrides(&mut self, overrides: &Map<String, Value>) {
        for (key, value) in overrides {
            self.0.insert(key.clone(), value.clone());
        }
    }
}

/// A remote track announced by the endpoint
#[derive(Debug, Clone)]
pub struct RemoteTrack {
    /// Track media type
    pub kind: Modality,
    /// Identifier of the stream the track belongs to
    pub stream_id: String,
}

/// Events surfaced by a peer endpoint
///
/// All of these are informational at the transport level; none of them is an
/// error.
#[derive(Debug, Clone)]
pub enum EndpointEvent {
    /// ICE gathering state changed
    IceGathering(IceGatheringState),
    /// A local candidate was gathered; carries the candidate line
    IceCandidate(String),
    /// ICE connection / peer connection state changed
    ConnectionState(String),
    /// Signaling state changed
    SignalingState(String),
    /// A remote track arrived
    Track(RemoteTrack),
}

/// Events surfaced by the control channel transport
#[derive(Debug, Clone)]
pub enum ControlEvent {
    /// The channel is open and can carry traffic
    Open,
    /// An inbound text message
    Message(String),
}

/// A locally captured media track, produced by the (out of scope) media
/// subsystem
///
/// `as_any` lets endpoint implementations recover their concrete track type
/// on attachment.
pub trait LocalTrack: Send + Sync {
    /// Track identifier
    fn id(&self) -> String;
    /// Track media type
    fn kind(&self) -> Modality;
    /// Downcast hook for endpoint implementations
    fn as_any(&self) -> &dyn Any;
}

/// Outbound half of one track attachment
#[async_trait]
pub trait TrackSender: Send + Sync {
    /// Current transport-level send parameters
    async fn parameters(&self) -> SendParameters;

    /// Replace the send parameters (callers merge overrides before applying)
    async fn set_parameters(&self, params: SendParameters) -> Result<()>;

    /// Stop the locally originated track feeding this sender; a sender whose
    /// track is already gone treats this as a no-op
    async fn stop_track(&self) -> Result<()>;
}

/// Ordered reliable text channel used by the control protocol
#[async_trait]
pub trait ControlLink: Send + Sync {
    /// Send a UTF-8 text message
    async fn send_text(&self, text: &str) -> Result<()>;
}

/// The remote media element rebound by the transport handle on inbound tracks
pub trait MediaSink: Send + Sync {
    /// Identifier of the currently bound stream, if any
    fn stream_id(&self) -> Option<String>;

    /// Point the sink at a new remote stream
    fn bind_stream(&self, stream_id: &str);

    /// Force the sink unmuted/audible/auto-playing. Playback start may fail
    /// under autoplay restrictions; the caller logs and swallows that failure.
    fn ensure_audible(&self) -> Result<()>;
}

/// The peer-connection-like object the session core drives
///
/// Constructed and configured by the caller, injected into
/// [`crate::session::Session::start`]. The negotiation coordinator is the only
/// writer of the local/remote descriptions; event consumers only read.
#[async_trait]
pub trait PeerEndpoint: Send + Sync {
    /// Create a local offer description
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Apply a description as the local description
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    /// The currently applied local description, if any
    async fn local_description(&self) -> Option<SessionDescription>;

    /// Apply a description as the remote description
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    /// Current ICE gathering state
    fn ice_gathering_state(&self) -> IceGatheringState;

    /// Watch channel tracking gathering progress; dropping the receiver is
    /// the idempotent listener removal
    fn subscribe_ice(&self) -> watch::Receiver<IceGatheringState>;

    /// Take the endpoint's event stream. Single consumer: later calls return
    /// `None`.
    fn take_events(&self) -> Option<mpsc::Receiver<EndpointEvent>>;

    /// Attach a local track; returns the sender controlling its parameters
    async fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<Arc<dyn TrackSender>>;

    /// Declare a receive-only transceiver for the modality (viewer path)
    async fn add_recv_transceiver(&self, modality: Modality) -> Result<()>;

    /// All senders currently attached to the transport
    fn senders(&self) -> Vec<Arc<dyn TrackSender>>;

    /// Stop every transceiver that can be stopped; absence of transceivers is
    /// not an error
    async fn stop_transceivers(&self) -> Result<()>;

    /// Open the ordered reliable control channel with the given label
    async fn open_control_channel(
        &self,
        label: &str,
    ) -> Result<(Arc<dyn ControlLink>, mpsc::Receiver<ControlEvent>)>;

    /// Close the underlying transport
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_description_wire_format() {
        let desc = SessionDescription {
            kind: SdpKind::Offer,
            sdp: "v=0\r\n".to_string(),
        };
        let value = serde_json::to_value(&desc).unwrap();
        assert_eq!(value, json!({"type": "offer", "sdp": "v=0\r\n"}));

        let back: SessionDescription =
            serde_json::from_value(json!({"type": "answer", "sdp": "v=0\r\n"})).unwrap();
        assert_eq!(back.kind, SdpKind::Answer);
    }

    #[test]
    fn test_merge_is_shallow() {
        let mut params = SendParameters::default();
        params.0.insert("maxFramerate".to_string(), json!(30));
        params.0.insert("maxBitrate".to_string(), json!(100_000));

        let mut overrides = Map::new();
        overrides.insert("maxBitrate".to_string(), json!(500_000));
        params.merge_overrides(&overrides);

        assert_eq!(params.0["maxBitrate"], json!(500_000));
        assert_eq!(params.0["maxFramerate"], json!(30));
    }

    #[test]
    fn test_modality_display() {
        assert_eq!(Modality::Audio.to_string(), "audio");
        assert_eq!(Modality::Video.to_string(), "video");
        assert_eq!(serde_json::to_value(Modality::Video).unwrap(), json!("video"));
    }
}
