//! Control channel protocol
//!
//! The ordered data channel carries a small line protocol: the client sends a
//! literal handshake once the channel opens, and the server pushes either bare
//! tokens or single JSON objects tagged with a `type` field. Unparseable
//! payloads are delivered as raw text rather than treated as fatal.

use crate::endpoint::{ControlEvent, ControlLink};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Literal sent exactly once when the channel opens
pub const HANDSHAKE: &str = "handshake";

/// One classified inbound control message
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// Bare `change` token
    Change,
    /// Bare `tick` token
    Tick,
    /// `stopword`, bare or as a tagged object (payload kept when tagged)
    Stopword(Option<Value>),
    /// Tagged `warning` object
    Warning(Value),
    /// Tagged `error` object
    Error(Value),
    /// Tagged `send_input` object
    SendInput(Value),
    /// Tagged `fetch_output` object
    FetchOutput(Value),
    /// Anything else, including raw non-JSON text
    Other(Value),
}

impl ControlMessage {
    /// Classify one raw inbound payload. Bare tokens win over JSON parsing;
    /// payloads that are neither are wrapped as raw text.
    pub fn classify(raw: &str) -> ControlMessage {
        match raw {
            "change" => return ControlMessage::Change,
            "tick" => return ControlMessage::Tick,
            "stopword" => return ControlMessage::Stopword(None),
            _ => {}
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => {
                let tag = value.get("type").and_then(Value::as_str);
                match tag {
                    Some("warning") => ControlMessage::Warning(value),
                    Some("error") => ControlMessage::Error(value),
                    Some("send_input") => ControlMessage::SendInput(value),
                    Some("fetch_output") => ControlMessage::FetchOutput(value),
                    Some("stopword") => ControlMessage::Stopword(Some(value)),
                    _ => ControlMessage::Other(value),
                }
            }
            Err(err) => {
                debug!(error = %err, "control payload is not JSON, passing through as text");
                ControlMessage::Other(Value::String(raw.to_string()))
            }
        }
    }

    /// Whether this message carries a recognized protocol meaning
    pub fn is_recognized(&self) -> bool {
        !matches!(self, ControlMessage::Other(_))
    }
}

/// Callback invoked with classified control messages
pub type ControlCallback = Arc<dyn Fn(ControlMessage) + Send + Sync>;

/// Owns the control channel dispatch loop for one session
pub struct ControlChannel {
    link: Arc<dyn ControlLink>,
    dispatch: JoinHandle<()>,
}

impl ControlChannel {
    /// Start dispatching channel events. Every inbound message reaches
    /// `on_message`; recognized ones additionally reach `on_change`.
    pub fn attach(
        link: Arc<dyn ControlLink>,
        events: mpsc::Receiver<ControlEvent>,
        on_change: ControlCallback,
        on_message: ControlCallback,
    ) -> Self {
        let dispatch_link = link.clone();
        let dispatch = tokio::spawn(async move {
            dispatch_loop(dispatch_link, events, on_change, on_message).await;
        });
        Self { link, dispatch }
    }

    /// Send a raw text payload on the channel
    pub async fn send_text(&self, text: &str) -> crate::Result<()> {
        self.link.send_text(text).await
    }

    /// Stop the dispatch loop
    pub fn shutdown(&self) {
        self.dispatch.abort();
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        self.dispatch.abort();
    }
}

async fn dispatch_loop(
    link: Arc<dyn ControlLink>,
    mut events: mpsc::Receiver<ControlEvent>,
    on_change: ControlCallback,
    on_message: ControlCallback,
) {
    while let Some(event) = events.recv().await {
        match event {
            ControlEvent::Open => {
                debug!("control channel open, sending handshake");
                if let Err(err) = link.send_text(HANDSHAKE).await {
                    warn!(error = %err, "failed to send handshake");
                }
            }
            ControlEvent::Message(raw) => {
                let message = ControlMessage::classify(&raw);
                debug!(?message, "control message received");
                if message.is_recognized() {
                    on_change(message.clone());
                }
                on_message(message);
            }
        }
    }
    debug!("control event stream closed");
}
