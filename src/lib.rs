//! Peer connection negotiation and session lifecycle for streaming clients
//!
//! The crate drives one peer session end to end against a remote exchange
//! endpoint: offer creation, ICE gathering, signaling, track publication and
//! the text control channel, then ordered teardown.
//!
//! ```text
//! Session::start
//!   ├─ TransportHandle  routes connection events, rebinds the media sink
//!   ├─ ControlChannel   handshake + classified message dispatch
//!   ├─ track publication or receive-only transceiver
//!   └─ Negotiator       offer -> ICE wait -> exchange -> answer
//! ```
//!
//! The session core is written against the [`endpoint::PeerEndpoint`] seam;
//! [`rtc::RtcEndpoint`] is the production implementation over the `webrtc`
//! crate, and tests drive the same core through mocks.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod control;
pub mod endpoint;
pub mod error;
pub mod negotiation;
pub mod rtc;
pub mod session;
pub mod signaling;
pub mod transport;

pub use config::{IceWaitPolicy, SessionConfig};
pub use control::{ControlChannel, ControlMessage, HANDSHAKE};
pub use endpoint::{
    ControlEvent, EndpointEvent, IceGatheringState, Modality, PeerEndpoint, SdpKind,
    SendParameters, SessionDescription,
};
pub use error::{Error, Result};
pub use negotiation::Negotiator;
pub use rtc::RtcEndpoint;
pub use session::{LocalStream, Session, StartOptions};
pub use signaling::{FnExchange, OfferPayload, SignalingExchange, SignalingReply};

/// Crate version string
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
