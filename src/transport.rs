//! Connection event routing
//!
//! Bridges the endpoint's event stream to logging and, when a media sink is
//! attached, to playback. State transitions are logged for diagnostics; remote
//! tracks are bound to the sink by stream, and audio tracks get a playback
//! nudge whose failure is tolerated.

use crate::endpoint::{EndpointEvent, MediaSink, Modality, PeerEndpoint, RemoteTrack};
use crate::error::{Error, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Owns the event dispatch loop for one peer endpoint
pub struct TransportHandle {
    endpoint: Arc<dyn PeerEndpoint>,
    dispatch: JoinHandle<()>,
}

impl TransportHandle {
    /// Take the endpoint's event stream and start routing it. Fails if the
    /// stream was already taken.
    pub fn attach(
        endpoint: Arc<dyn PeerEndpoint>,
        sink: Option<Arc<dyn MediaSink>>,
    ) -> Result<Self> {
        let mut events = endpoint.take_events().ok_or(Error::ChannelClosed)?;
        let dispatch = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                route_event(event, sink.as_deref());
            }
            debug!("endpoint event stream closed");
        });
        Ok(Self { endpoint, dispatch })
    }

    /// The endpoint this handle routes for
    pub fn endpoint(&self) -> &Arc<dyn PeerEndpoint> {
        &self.endpoint
    }

    /// Stop the dispatch loop
    pub fn shutdown(&self) {
        self.dispatch.abort();
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.dispatch.abort();
    }
}

fn route_event(event: EndpointEvent, sink: Option<&dyn MediaSink>) {
    match event {
        EndpointEvent::IceGathering(state) => {
            debug!(?state, "ice gathering state changed");
        }
        EndpointEvent::IceCandidate(candidate) => {
            debug!(candidate = %candidate, "ice candidate gathered");
        }
        EndpointEvent::ConnectionState(state) => {
            debug!(%state, "ice connection state changed");
        }
        EndpointEvent::SignalingState(state) => {
            debug!(%state, "signaling state changed");
        }
        EndpointEvent::Track(track) => route_track(track, sink),
    }
}

fn route_track(track: RemoteTrack, sink: Option<&dyn MediaSink>) {
    debug!(kind = %track.kind, stream_id = %track.stream_id, "remote track received");
    let Some(sink) = sink else {
        return;
    };
    // Rebind only on a new stream; repeated tracks of the same stream share it
    if sink.stream_id().as_deref() != Some(track.stream_id.as_str()) {
        sink.bind_stream(&track.stream_id);
    }
    if track.kind == Modality::Audio {
        if let Err(err) = sink.ensure_audible() {
            debug!(error = %err, "audio playback nudge failed, continuing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        bound: Mutex<Option<String>>,
        calls: Mutex<Vec<String>>,
        fail_audible: bool,
    }

    impl RecordingSink {
        fn new(fail_audible: bool) -> Self {
            Self {
                bound: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
                fail_audible,
            }
        }
    }

    impl MediaSink for RecordingSink {
        fn stream_id(&self) -> Option<String> {
            self.bound.lock().unwrap().clone()
        }

        fn bind_stream(&self, stream_id: &str) {
            *self.bound.lock().unwrap() = Some(stream_id.to_string());
            self.calls.lock().unwrap().push(format!("bind:{stream_id}"));
        }

        fn ensure_audible(&self) -> Result<()> {
            self.calls.lock().unwrap().push("audible".to_string());
            if self.fail_audible {
                Err(Error::media("autoplay blocked"))
            } else {
                Ok(())
            }
        }
    }

    fn track(kind: Modality, stream_id: &str) -> RemoteTrack {
        RemoteTrack {
            kind,
            stream_id: stream_id.to_string(),
        }
    }

    #[test]
    fn test_track_binds_new_stream_once() {
        let sink = RecordingSink::new(false);
        route_track(track(Modality::Video, "s1"), Some(&sink));
        route_track(track(Modality::Video, "s1"), Some(&sink));
        assert_eq!(*sink.calls.lock().unwrap(), vec!["bind:s1".to_string()]);
    }

    #[test]
    fn test_audio_track_gets_playback_nudge() {
        let sink = RecordingSink::new(false);
        route_track(track(Modality::Audio, "s1"), Some(&sink));
        assert_eq!(
            *sink.calls.lock().unwrap(),
            vec!["bind:s1".to_string(), "audible".to_string()]
        );
    }

    #[test]
    fn test_playback_nudge_failure_is_swallowed() {
        let sink = RecordingSink::new(true);
        route_track(track(Modality::Audio, "s1"), Some(&sink));
        // No panic, stream still bound
        assert_eq!(sink.stream_id().as_deref(), Some("s1"));
    }

    #[test]
    fn test_events_without_sink_are_logged_only() {
        route_event(EndpointEvent::ConnectionState("connected".to_string()), None);
        route_event(EndpointEvent::Track(track(Modality::Audio, "s1")), None);
    }
}
