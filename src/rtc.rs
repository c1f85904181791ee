//! Production endpoint over the `webrtc` crate
//!
//! [`RtcEndpoint`] adapts an [`RTCPeerConnection`] to the [`PeerEndpoint`]
//! seam the session core drives. ICE gathering is mirrored into a watch
//! channel so any number of waiters can observe progress, and the remaining
//! connection callbacks feed one bounded event stream consumed by the
//! transport handle.

use crate::endpoint::{
    ControlEvent, ControlLink, EndpointEvent, IceGatheringState, LocalTrack, Modality,
    PeerEndpoint, RemoteTrack, SdpKind, SendParameters, SessionDescription, TrackSender,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::any::Any;
use std::fmt::Display;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::TrackLocal;

/// Bound on buffered connection events before backpressure drops them
const EVENT_CHANNEL_CAPACITY: usize = 64;

fn to_transport(err: impl Display) -> Error {
    Error::transport(err.to_string())
}

fn map_gatherer_state(state: RTCIceGathererState) -> IceGatheringState {
    match state {
        RTCIceGathererState::Gathering => IceGatheringState::Gathering,
        RTCIceGathererState::Complete | RTCIceGathererState::Closed => IceGatheringState::Complete,
        _ => IceGatheringState::New,
    }
}

fn map_codec_type(kind: RTPCodecType) -> Modality {
    match kind {
        RTPCodecType::Audio => Modality::Audio,
        _ => Modality::Video,
    }
}

fn to_rtc_description(desc: &SessionDescription) -> Result<RTCSessionDescription> {
    match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp.clone()).map_err(to_transport),
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp.clone()).map_err(to_transport),
    }
}

fn from_rtc_description(desc: &RTCSessionDescription) -> Result<SessionDescription> {
    let kind = match desc.sdp_type {
        RTCSdpType::Offer => SdpKind::Offer,
        RTCSdpType::Answer => SdpKind::Answer,
        other => {
            return Err(Error::transport(format!(
                "unsupported description type {other}"
            )))
        }
    };
    Ok(SessionDescription {
        kind,
        sdp: desc.sdp.clone(),
    })
}

/// A local track backed by the `webrtc` crate
pub struct RtcLocalTrack {
    track: Arc<dyn TrackLocal + Send + Sync>,
    kind: Modality,
}

impl RtcLocalTrack {
    /// Wrap a concrete local track for attachment through the session core
    pub fn new(track: Arc<dyn TrackLocal + Send + Sync>, kind: Modality) -> Self {
        Self { track, kind }
    }
}

impl LocalTrack for RtcLocalTrack {
    fn id(&self) -> String {
        self.track.id().to_string()
    }

    fn kind(&self) -> Modality {
        self.kind
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Sender wrapper controlling one attached local track
///
/// The underlying crate exposes no parameter mutation on an active sender, so
/// override merges are recorded as encoding hints and logged. Stopping the
/// sender stops its track at the transport level.
pub struct RtcTrackSender {
    sender: Arc<RTCRtpSender>,
    params: Mutex<SendParameters>,
}

#[async_trait]
impl TrackSender for RtcTrackSender {
    async fn parameters(&self) -> SendParameters {
        self.params.lock().await.clone()
    }

    async fn set_parameters(&self, params: SendParameters) -> Result<()> {
        debug!(?params, "recording sender parameter hints");
        *self.params.lock().await = params;
        Ok(())
    }

    async fn stop_track(&self) -> Result<()> {
        self.sender.stop().await.map_err(to_transport)
    }
}

/// Control channel wrapper over an open data channel
pub struct RtcControlLink {
    channel: Arc<RTCDataChannel>,
}

#[async_trait]
impl ControlLink for RtcControlLink {
    async fn send_text(&self, text: &str) -> Result<()> {
        self.channel
            .send_text(text.to_string())
            .await
            .map(|_| ())
            .map_err(to_transport)
    }
}

/// [`PeerEndpoint`] implementation over an [`RTCPeerConnection`]
pub struct RtcEndpoint {
    pc: Arc<RTCPeerConnection>,
    ice_tx: watch::Sender<IceGatheringState>,
    events: StdMutex<Option<mpsc::Receiver<EndpointEvent>>>,
    senders: StdMutex<Vec<Arc<dyn TrackSender>>>,
}

impl RtcEndpoint {
    /// Build a connection with default codecs and interceptors
    pub async fn connect(config: RTCConfiguration) -> Result<Arc<RtcEndpoint>> {
        let mut media = MediaEngine::default();
        media.register_default_codecs().map_err(to_transport)?;
        let registry =
            register_default_interceptors(Registry::new(), &mut media).map_err(to_transport)?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();
        let pc = api
            .new_peer_connection(config)
            .await
            .map_err(to_transport)?;
        Ok(Self::wrap(Arc::new(pc)))
    }

    /// Connection configuration with a public STUN server
    pub fn default_config() -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: vec!["stun:stun.l.google.com:19302".to_string()],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    /// Adapt an existing connection, mirroring its callbacks into the event
    /// stream and the ICE watch channel
    pub fn wrap(pc: Arc<RTCPeerConnection>) -> Arc<RtcEndpoint> {
        let (ice_tx, _) = watch::channel(IceGatheringState::New);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let endpoint = Arc::new(RtcEndpoint {
            pc: pc.clone(),
            ice_tx: ice_tx.clone(),
            events: StdMutex::new(Some(event_rx)),
            senders: StdMutex::new(Vec::new()),
        });

        let gathering_tx = event_tx.clone();
        let gathering_ice = ice_tx.clone();
        pc.on_ice_gathering_state_change(Box::new(move |state| {
            let mapped = map_gatherer_state(state);
            let _ = gathering_ice.send(mapped);
            let tx = gathering_tx.clone();
            Box::pin(async move {
                let _ = tx.send(EndpointEvent::IceGathering(mapped)).await;
            })
        }));

        let candidate_tx = event_tx.clone();
        pc.on_ice_candidate(Box::new(move |candidate| {
            let ice = ice_tx.clone();
            let tx = candidate_tx.clone();
            Box::pin(async move {
                match candidate {
                    Some(candidate) => {
                        let _ = ice.send(IceGatheringState::Gathering);
                        if let Ok(json) = candidate.to_json() {
                            let _ = tx.send(EndpointEvent::IceCandidate(json.candidate)).await;
                        }
                    }
                    None => {
                        // End-of-candidates sentinel
                        let _ = ice.send(IceGatheringState::Complete);
                    }
                }
            })
        }));

        let connection_tx = event_tx.clone();
        pc.on_ice_connection_state_change(Box::new(move |state| {
            let tx = connection_tx.clone();
            Box::pin(async move {
                let _ = tx
                    .send(EndpointEvent::ConnectionState(state.to_string()))
                    .await;
            })
        }));

        let signaling_tx = event_tx.clone();
        pc.on_signaling_state_change(Box::new(move |state| {
            let tx = signaling_tx.clone();
            Box::pin(async move {
                let _ = tx
                    .send(EndpointEvent::SignalingState(state.to_string()))
                    .await;
            })
        }));

        let track_tx = event_tx;
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let remote = RemoteTrack {
                kind: map_codec_type(track.kind()),
                stream_id: track.stream_id(),
            };
            let tx = track_tx.clone();
            Box::pin(async move {
                let _ = tx.send(EndpointEvent::Track(remote)).await;
            })
        }));

        endpoint
    }
}

#[async_trait]
impl PeerEndpoint for RtcEndpoint {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.pc.create_offer(None).await.map_err(to_transport)?;
        from_rtc_description(&offer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = to_rtc_description(&desc)?;
        self.pc
            .set_local_description(desc)
            .await
            .map_err(to_transport)
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let desc = self.pc.local_description().await?;
        from_rtc_description(&desc).ok()
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = to_rtc_description(&desc)?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(to_transport)
    }

    fn ice_gathering_state(&self) -> IceGatheringState {
        *self.ice_tx.borrow()
    }

    fn subscribe_ice(&self) -> watch::Receiver<IceGatheringState> {
        self.ice_tx.subscribe()
    }

    fn take_events(&self) -> Option<mpsc::Receiver<EndpointEvent>> {
        self.events.lock().ok().and_then(|mut guard| guard.take())
    }

    async fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<Arc<dyn TrackSender>> {
        let rtc_track = track
            .as_any()
            .downcast_ref::<RtcLocalTrack>()
            .ok_or_else(|| Error::transport("track was not built for this endpoint"))?;
        let sender = self
            .pc
            .add_track(rtc_track.track.clone())
            .await
            .map_err(to_transport)?;
        debug!(track_id = %track.id(), kind = %track.kind(), "local track attached");
        let sender: Arc<dyn TrackSender> = Arc::new(RtcTrackSender {
            sender,
            params: Mutex::new(SendParameters::default()),
        });
        if let Ok(mut senders) = self.senders.lock() {
            senders.push(sender.clone());
        }
        Ok(sender)
    }

    async fn add_recv_transceiver(&self, modality: Modality) -> Result<()> {
        let kind = match modality {
            Modality::Audio => RTPCodecType::Audio,
            Modality::Video => RTPCodecType::Video,
        };
        self.pc
            .add_transceiver_from_kind(
                kind,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(to_transport)?;
        debug!(%modality, "receive-only transceiver added");
        Ok(())
    }

    fn senders(&self) -> Vec<Arc<dyn TrackSender>> {
        self.senders
            .lock()
            .map(|senders| senders.clone())
            .unwrap_or_default()
    }

    async fn stop_transceivers(&self) -> Result<()> {
        for transceiver in self.pc.get_transceivers().await {
            if let Err(err) = transceiver.stop().await {
                debug!(error = %err, "stopping transceiver failed, continuing");
            }
        }
        Ok(())
    }

    async fn open_control_channel(
        &self,
        label: &str,
    ) -> Result<(Arc<dyn ControlLink>, mpsc::Receiver<ControlEvent>)> {
        let channel = self
            .pc
            .create_data_channel(
                label,
                Some(RTCDataChannelInit {
                    ordered: Some(true),
                    ..Default::default()
                }),
            )
            .await
            .map_err(to_transport)?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let open_tx = tx.clone();
        channel.on_open(Box::new(move || {
            let tx = open_tx.clone();
            Box::pin(async move {
                let _ = tx.send(ControlEvent::Open).await;
            })
        }));

        channel.on_message(Box::new(move |message| {
            let text = String::from_utf8_lossy(&message.data).into_owned();
            let tx = tx.clone();
            Box::pin(async move {
                if tx.send(ControlEvent::Message(text)).await.is_err() {
                    warn!("control event consumer dropped, discarding message");
                }
            })
        }));

        Ok((Arc::new(RtcControlLink { channel }), rx))
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await.map_err(to_transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gatherer_state_mapping() {
        assert_eq!(
            map_gatherer_state(RTCIceGathererState::New),
            IceGatheringState::New
        );
        assert_eq!(
            map_gatherer_state(RTCIceGathererState::Gathering),
            IceGatheringState::Gathering
        );
        assert_eq!(
            map_gatherer_state(RTCIceGathererState::Complete),
            IceGatheringState::Complete
        );
        assert_eq!(
            map_gatherer_state(RTCIceGathererState::Closed),
            IceGatheringState::Complete
        );
    }

    #[test]
    fn test_description_mapping_round_trip() {
        let desc = SessionDescription {
            kind: SdpKind::Answer,
            sdp: "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n".to_string(),
        };
        let rtc = to_rtc_description(&desc).unwrap();
        assert_eq!(rtc.sdp_type, RTCSdpType::Answer);
        assert_eq!(from_rtc_description(&rtc).unwrap(), desc);
    }

    #[tokio::test]
    async fn test_offer_and_control_channel() {
        let endpoint = RtcEndpoint::connect(RtcEndpoint::default_config())
            .await
            .unwrap();

        let (link, _events) = endpoint.open_control_channel("text").await.unwrap();
        // Channel not open yet; sending must fail rather than hang
        assert!(link.send_text("handshake").await.is_err());

        let offer = endpoint.create_offer().await.unwrap();
        assert_eq!(offer.kind, SdpKind::Offer);
        assert!(offer.sdp.contains("v=0"));

        endpoint.close().await.unwrap();
    }
}
