//! Session lifecycle
//!
//! Ties the pieces together: attach the event router, open the control
//! channel, publish local tracks or register receive-only transceivers, run
//! negotiation, and later tear everything down in order with a short grace
//! period before closing the connection.

use crate::config::SessionConfig;
use crate::control::{ControlCallback, ControlChannel};
use crate::endpoint::{LocalTrack, MediaSink, PeerEndpoint};
use crate::error::Result;
use crate::negotiation::{Negotiator, RejectCallback};
use crate::signaling::SignalingExchange;
use crate::transport::TransportHandle;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A local media stream: an identifier plus the tracks to publish
pub struct LocalStream {
    /// Stream identifier
    pub id: String,
    /// Tracks to publish
    pub tracks: Vec<Arc<dyn LocalTrack>>,
}

/// Everything needed to start one session
pub struct StartOptions {
    /// The peer endpoint to drive
    pub endpoint: Arc<dyn PeerEndpoint>,
    /// Optional playback sink for remote tracks
    pub sink: Option<Arc<dyn MediaSink>>,
    /// The remote exchange
    pub exchange: Arc<dyn SignalingExchange>,
    /// Opaque session identifier
    pub session_id: String,
    /// Local media to publish; `None` selects the receive-only path
    pub stream: Option<LocalStream>,
    /// Session configuration
    pub config: SessionConfig,
    /// Callback for recognized control messages
    pub on_change: ControlCallback,
    /// Callback for every control message
    pub on_message: ControlCallback,
    /// Optional callback observing server rejections
    pub on_reject: Option<RejectCallback>,
}

/// A running session
pub struct Session {
    id: String,
    transport: TransportHandle,
    control: ControlChannel,
    close_grace: Duration,
}

impl Session {
    /// Start a session: wire events, open the control channel, publish or
    /// receive media, and negotiate with the remote exchange.
    pub async fn start(options: StartOptions) -> Result<Session> {
        let StartOptions {
            endpoint,
            sink,
            exchange,
            session_id,
            stream,
            config,
            on_change,
            on_message,
            on_reject,
        } = options;
        config.validate()?;
        info!(session_id = %session_id, modality = %config.modality, "starting session");

        let transport = TransportHandle::attach(endpoint.clone(), sink)?;

        let (link, control_events) = endpoint
            .open_control_channel(&config.control_channel_label)
            .await?;
        let control = ControlChannel::attach(link, control_events, on_change, on_message);

        match stream {
            Some(stream) => attach_tracks(&endpoint, stream, &config).await?,
            None => {
                debug!(modality = %config.modality, "no local media, receiving only");
                endpoint.add_recv_transceiver(config.modality).await?;
            }
        }

        let mut negotiator = Negotiator::new(
            endpoint,
            exchange,
            session_id.clone(),
            config.ice_wait,
        );
        if let Some(on_reject) = on_reject {
            negotiator = negotiator.with_reject_callback(on_reject);
        }
        negotiator.run().await?;

        Ok(Session {
            id: session_id,
            transport,
            control,
            close_grace: config.close_grace(),
        })
    }

    /// Session identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The control channel for this session
    pub fn control(&self) -> &ControlChannel {
        &self.control
    }

    /// The underlying endpoint
    pub fn endpoint(&self) -> &Arc<dyn PeerEndpoint> {
        self.transport.endpoint()
    }

    /// Tear the session down: stop transceivers, stop sender tracks, then
    /// close the connection after a short grace period. Safe on sessions
    /// with nothing attached.
    pub async fn stop(self) -> Result<()> {
        info!(session_id = %self.id, "stopping session");
        let endpoint = self.transport.endpoint().clone();

        if let Err(err) = endpoint.stop_transceivers().await {
            debug!(error = %err, "stopping transceivers failed, continuing");
        }
        for sender in endpoint.senders() {
            if let Err(err) = sender.stop_track().await {
                debug!(error = %err, "stopping sender track failed, continuing");
            }
        }

        self.control.shutdown();
        self.transport.shutdown();

        tokio::time::sleep(self.close_grace).await;
        endpoint.close().await?;
        debug!(session_id = %self.id, "session closed");
        Ok(())
    }
}

async fn attach_tracks(
    endpoint: &Arc<dyn PeerEndpoint>,
    stream: LocalStream,
    config: &SessionConfig,
) -> Result<()> {
    debug!(stream_id = %stream.id, tracks = stream.tracks.len(), "publishing local stream");
    for track in stream.tracks {
        let sender = endpoint.add_track(track).await?;
        let overrides = config.rtp_overrides.clone();
        // Each attachment gets exactly one parameter update, a plain
        // re-apply when there are no overrides; session start does not
        // block on it and a failure only degrades the encoding
        tokio::spawn(async move {
            let mut params = sender.parameters().await;
            params.merge_overrides(&overrides);
            if let Err(err) = sender.set_parameters(params).await {
                warn!(error = %err, "applying rtp parameter overrides failed");
            }
        });
    }
    Ok(())
}
